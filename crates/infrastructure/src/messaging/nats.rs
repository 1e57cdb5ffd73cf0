//! NATS JetStream publisher.
//!
//! Implements the broker publisher port on NATS JetStream. Each publish
//! carries a `Nats-Msg-Id` header set to the envelope id, so the stream's
//! duplicate window gives idempotent-producer semantics, and the call only
//! returns once the JetStream acknowledgment arrives — a genuine
//! durability guarantee, not a send-attempted signal.
//!
//! # Subject Mapping
//!
//! Messages are published to `{topic}.{key}`. JetStream preserves order
//! per subject, so all events for one aggregate id are observed in
//! publish order, exactly as a partitioned broker would order them by
//! partition key.

use arkiva_relay_domain::broker::{BrokerPublisher, PublishError};
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::ConnectOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// NATS connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URLs
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connection_timeout_secs: u64,
    /// Request timeout in seconds (None = no timeout)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: Option<u64>,
    /// Max reconnection attempts (None = infinite)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: Option<usize>,
    /// Client connection name
    #[serde(default)]
    pub name: Option<String>,
    /// JetStream duplicate-detection window in seconds
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            connection_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_reconnects: default_max_reconnects(),
            name: Some("arkiva-relay".to_string()),
            duplicate_window_secs: default_duplicate_window(),
        }
    }
}

fn default_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> Option<u64> {
    Some(30)
}

fn default_max_reconnects() -> Option<usize> {
    Some(5)
}

const fn default_duplicate_window() -> u64 {
    120
}

impl NatsConfig {
    /// Build a config pointing at a single URL, defaults elsewhere.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Self::default()
        }
    }

    /// Returns the primary URL for connection
    pub fn primary_url(&self) -> &str {
        self.urls
            .first()
            .map(|s| s.as_str())
            .unwrap_or("nats://localhost:4222")
    }
}

/// JetStream-backed broker publisher.
#[derive(Clone)]
pub struct NatsPublisher {
    jetstream: JetStreamContext,
    duplicate_window: Duration,
}

impl NatsPublisher {
    /// Connect to NATS and create a JetStream publisher.
    ///
    /// # Errors
    /// Returns an error if connection to NATS fails.
    pub async fn connect(config: NatsConfig) -> Result<Self, PublishError> {
        let mut connect_options = ConnectOptions::default()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs));

        if let Some(timeout_secs) = config.request_timeout_secs {
            connect_options =
                connect_options.request_timeout(Some(Duration::from_secs(timeout_secs)));
        }

        if let Some(name) = &config.name {
            connect_options = connect_options.name(name);
        }

        if let Some(max_reconnects) = config.max_reconnects {
            connect_options = connect_options.max_reconnects(max_reconnects);
        }

        let client = async_nats::connect_with_options(config.primary_url(), connect_options)
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let jetstream = async_nats::jetstream::new(client);

        info!(url = %config.primary_url(), "Connected to NATS");

        Ok(Self {
            jetstream,
            duplicate_window: Duration::from_secs(config.duplicate_window_secs),
        })
    }

    /// Ensure the JetStream stream for a topic exists.
    ///
    /// The stream captures `{topic}.>` so every per-aggregate subject
    /// lands in it, with the duplicate window enabling `Nats-Msg-Id`
    /// deduplication.
    pub async fn ensure_stream(&self, topic: &str) -> Result<(), PublishError> {
        let stream_name = stream_name_for_topic(topic);

        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: stream_name.clone(),
                subjects: vec![format!("{topic}.>")],
                duplicate_window: self.duplicate_window,
                ..Default::default()
            })
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        debug!(stream = %stream_name, topic = %topic, "Stream ready");
        Ok(())
    }
}

/// Stream names may not contain subject separators.
fn stream_name_for_topic(topic: &str) -> String {
    topic.replace('.', "_").to_uppercase()
}

#[async_trait]
impl BrokerPublisher for NatsPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        message_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let subject = format!("{topic}.{key}");

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id);

        let ack = self
            .jetstream
            .publish_with_headers(subject, headers, payload.into())
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        // The publish future resolves on send; the ack future resolves
        // once JetStream has durably accepted the message.
        ack.await
            .map_err(|e| PublishError::Acknowledgment(e.to_string()))?;

        Ok(())
    }
}
