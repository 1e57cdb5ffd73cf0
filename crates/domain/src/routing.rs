//! Topic Router
//!
//! Maps an outbox row's logical aggregate name to a destination topic.
//! The mapping is a static table supplied at startup; an unmapped
//! aggregate is a hard configuration failure, never swallowed.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("No topic mapped for aggregate '{0}'")]
    UnmappedAggregate(String),
}

/// Static aggregate-name to topic-name lookup table.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    topics: HashMap<String, String>,
}

impl TopicRouter {
    /// Build a router from an explicit mapping table.
    pub fn new(topics: HashMap<String, String>) -> Self {
        Self { topics }
    }

    /// The stock Arkiva mapping: document-side aggregates go to the
    /// documents topic, identity aggregates to the IAM topic.
    pub fn arkiva_defaults() -> Self {
        let mut topics = HashMap::new();
        for aggregate in ["document", "tag", "share"] {
            topics.insert(aggregate.to_string(), "arkiva.events.documents".to_string());
        }
        for aggregate in ["user", "group"] {
            topics.insert(aggregate.to_string(), "arkiva.events.iam".to_string());
        }
        Self { topics }
    }

    /// Resolve the destination topic for an aggregate name.
    pub fn resolve(&self, aggregate: &str) -> Result<&str, RoutingError> {
        self.topics
            .get(aggregate)
            .map(String::as_str)
            .ok_or_else(|| RoutingError::UnmappedAggregate(aggregate.to_string()))
    }

    /// All distinct destination topics, for startup stream provisioning.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.topics.values().map(String::as_str).collect();
        topics.sort_unstable();
        topics.dedup();
        topics
    }
}
