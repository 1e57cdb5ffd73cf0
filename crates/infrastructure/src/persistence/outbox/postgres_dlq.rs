//! PostgreSQL Dead-Letter Store
//!
//! Upsert and inspection of `outbox_deadletter` rows. Escalation happens
//! inside the claim's own transaction (see
//! [`PostgresOutboxStore`](super::PostgresOutboxStore)); this module holds
//! the shared upsert plus the operator-facing read and replay surface.

use arkiva_relay_domain::outbox::{DeadLetterEntry, OutboxError};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, PgConnection};

/// Row struct for dead-letter queries
#[derive(FromRow)]
struct DeadLetterRow {
    id: i64,
    #[sqlx(rename = "type")]
    event_type: String,
    payload: sqlx::types::Json<serde_json::Value>,
    error: String,
    failed_at: chrono::DateTime<chrono::Utc>,
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            payload: row.payload.0,
            error: row.error,
            failed_at: row.failed_at,
        }
    }
}

/// Upsert a dead-letter row on an existing connection or transaction.
///
/// Keyed by the outbox row id; a repeated escalation overwrites the error
/// and timestamp instead of inserting a second row.
pub async fn upsert_dead_letter(
    conn: &mut PgConnection,
    entry: &DeadLetterEntry,
) -> Result<(), OutboxError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_deadletter (id, type, payload, error, failed_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET error = EXCLUDED.error,
            failed_at = EXCLUDED.failed_at
        "#,
    )
    .bind(entry.id)
    .bind(&entry.event_type)
    .bind(&entry.payload)
    .bind(&entry.error)
    .bind(entry.failed_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// PostgreSQL dead-letter store for inspection and manual replay.
pub struct PostgresDeadLetterStore {
    pool: PgPool,
}

impl PostgresDeadLetterStore {
    /// Create a new PostgreSQL dead-letter store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a dead-letter entry by outbox row id.
    pub async fn get(&self, id: i64) -> Result<Option<DeadLetterEntry>, OutboxError> {
        let row: Option<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, type, payload, error, failed_at
            FROM outbox_deadletter
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DeadLetterEntry::from))
    }

    /// List dead-letter entries, oldest failure first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT id, type, payload, error, failed_at
            FROM outbox_deadletter
            ORDER BY failed_at ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeadLetterEntry::from).collect())
    }

    /// Count dead-letter entries.
    pub async fn count(&self) -> Result<u64, OutboxError> {
        #[derive(FromRow)]
        struct CountRow {
            count: i64,
        }

        let result: CountRow = sqlx::query_as("SELECT COUNT(*) as count FROM outbox_deadletter")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.count as u64)
    }

    /// Operator-initiated replay: delete the dead-letter row and clear the
    /// outbox row's terminal marker in one transaction, so the relay picks
    /// it up again on its next poll.
    ///
    /// This is a manual intervention tool; the relay itself never reopens
    /// a terminal row.
    pub async fn requeue(&self, id: i64) -> Result<(), OutboxError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM outbox_deadletter WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(OutboxError::NotFound(id));
        }

        sqlx::query("UPDATE outbox SET processed_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
