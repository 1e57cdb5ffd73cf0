//! PostgreSQL Outbox Store
//!
//! SQLx-based implementation of the outbox store ports. Claims are
//! row-scoped transactions: the oldest pending row is selected with
//! `FOR UPDATE SKIP LOCKED`, so concurrent relay instances interleave
//! over the queue instead of blocking behind one another, and at most one
//! instance works a given row at any instant.

use arkiva_relay_domain::outbox::{
    ClaimedEntry, DeadLetterEntry, NewOutboxEntry, OutboxEntry, OutboxError, OutboxStats,
    OutboxStore,
};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, PgConnection, Postgres, Transaction};
use uuid::Uuid;

use super::postgres_dlq::upsert_dead_letter;

/// Row struct for outbox queries
#[derive(FromRow)]
struct OutboxRow {
    id: i64,
    aggregate: String,
    aggregate_id: Uuid,
    #[sqlx(rename = "type")]
    event_type: String,
    payload: sqlx::types::Json<serde_json::Value>,
    occurred_at: chrono::DateTime<chrono::Utc>,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            aggregate: row.aggregate,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload.0,
            occurred_at: row.occurred_at,
            processed_at: row.processed_at,
        }
    }
}

/// PostgreSQL implementation of the outbox store.
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Create a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations for the outbox and dead-letter tables.
    pub async fn run_migrations(&self) -> Result<(), OutboxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id BIGSERIAL PRIMARY KEY,
                aggregate TEXT NOT NULL,
                aggregate_id UUID NOT NULL,
                type TEXT NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_outbox_pending
            ON outbox (id)
            WHERE processed_at IS NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox_deadletter (
                id BIGINT PRIMARY KEY,
                type TEXT NOT NULL,
                payload JSONB NOT NULL,
                error TEXT NOT NULL,
                failed_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert outbox rows using the store's own pool.
    ///
    /// Production code should prefer [`append_in_tx`](Self::append_in_tx)
    /// from inside the business transaction; this variant exists for
    /// tooling and tests.
    pub async fn append(&self, entries: &[NewOutboxEntry]) -> Result<(), OutboxError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut query_builder = build_insert(entries);
        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Insert outbox rows on an existing connection or transaction.
    ///
    /// The producing application must call this inside the same
    /// transaction that commits the triggering business change, or the
    /// relay's delivery guarantee degrades to best-effort.
    pub async fn append_in_tx(
        conn: &mut PgConnection,
        entries: &[NewOutboxEntry],
    ) -> Result<(), OutboxError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut query_builder = build_insert(entries);
        query_builder.build().execute(conn).await?;
        Ok(())
    }

    /// Count rows still awaiting delivery.
    pub async fn count_pending(&self) -> Result<u64, OutboxError> {
        #[derive(FromRow)]
        struct CountRow {
            count: i64,
        }

        let result: CountRow = sqlx::query_as(
            r#"
            SELECT COUNT(*) as count
            FROM outbox
            WHERE processed_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(result.count as u64)
    }

    /// Aggregate outbox statistics for periodic logging.
    pub async fn stats(&self) -> Result<OutboxStats, OutboxError> {
        #[derive(FromRow)]
        struct StatsRow {
            pending_count: Option<i64>,
            processed_count: Option<i64>,
            oldest_pending_age_seconds: Option<i64>,
        }

        let result: StatsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN processed_at IS NULL THEN 1 END) as pending_count,
                COUNT(CASE WHEN processed_at IS NOT NULL THEN 1 END) as processed_count,
                CAST(MIN(CASE WHEN processed_at IS NULL THEN EXTRACT(EPOCH FROM (NOW() - occurred_at)) END) AS BIGINT) as oldest_pending_age_seconds
            FROM outbox
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxStats {
            pending_count: result.pending_count.unwrap_or(0) as u64,
            processed_count: result.processed_count.unwrap_or(0) as u64,
            oldest_pending_age_seconds: result.oldest_pending_age_seconds,
        })
    }
}

fn build_insert(entries: &[NewOutboxEntry]) -> sqlx::QueryBuilder<'_, Postgres> {
    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO outbox (aggregate, aggregate_id, type, payload, occurred_at) ",
    );

    query_builder.push_values(entries, |mut b, entry| {
        b.push_bind(&entry.aggregate);
        b.push_bind(entry.aggregate_id);
        b.push_bind(&entry.event_type);
        b.push_bind(&entry.payload);
        b.push_bind(entry.occurred_at);
    });

    query_builder
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn claim_next(&self) -> Result<Option<Box<dyn ClaimedEntry>>, OutboxError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate, aggregate_id, type, payload, occurred_at, processed_at
            FROM outbox
            WHERE processed_at IS NULL
            ORDER BY id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            None => {
                tx.commit().await?;
                Ok(None)
            }
            Some(row) => Ok(Some(Box::new(PostgresClaim {
                entry: row.into(),
                tx,
            }))),
        }
    }
}

/// A claimed row and the transaction holding its lock.
///
/// Dropping the claim rolls the transaction back, releasing the lock and
/// leaving the row pending.
struct PostgresClaim {
    entry: OutboxEntry,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ClaimedEntry for PostgresClaim {
    fn entry(&self) -> &OutboxEntry {
        &self.entry
    }

    async fn mark_processed(self: Box<Self>) -> Result<(), OutboxError> {
        let mut this = *self;

        sqlx::query("UPDATE outbox SET processed_at = NOW() WHERE id = $1")
            .bind(this.entry.id)
            .execute(&mut *this.tx)
            .await?;

        this.tx.commit().await?;
        Ok(())
    }

    async fn dead_letter(self: Box<Self>, error: &str) -> Result<(), OutboxError> {
        let mut this = *self;

        let dead = DeadLetterEntry::from_entry(&this.entry, error);
        upsert_dead_letter(&mut *this.tx, &dead).await?;

        sqlx::query("UPDATE outbox SET processed_at = NOW() WHERE id = $1")
            .bind(this.entry.id)
            .execute(&mut *this.tx)
            .await?;

        this.tx.commit().await?;
        Ok(())
    }
}
