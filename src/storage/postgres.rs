//! PostgreSQL implementation of the storage gateway.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::classify::is_unique_violation;
use super::retry::retry_with_policy;
use super::{PRIMARY_TABLE, RecordStore, SECONDARY_TABLE};
use crate::config::StoreConfig;
use crate::domain::EventRecord;
use crate::error::StorageError;

const CREATE_PRIMARY: &str = "CREATE TABLE IF NOT EXISTS payment_events (\
     user_id BIGINT NOT NULL, \
     payment_id BIGINT PRIMARY KEY, \
     deposit_amount BIGINT NOT NULL)";

const CREATE_SECONDARY: &str = "CREATE TABLE IF NOT EXISTS skipped_messages (\
     user_id BIGINT NOT NULL, \
     payment_id BIGINT PRIMARY KEY, \
     deposit_amount BIGINT NOT NULL)";

/// Storage gateway backed by a `sqlx::PgPool`.
///
/// Constructed once at startup and shared behind an `Arc`; the pool is
/// safe for concurrent statement execution.
#[derive(Debug, Clone)]
pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens and pings a connection pool, retrying per `config.retry`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectExhausted`] when every attempt fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StorageError> {
        let policy = config.retry;
        let pool = retry_with_policy(policy, "postgres connect", |attempt| async move {
            tracing::debug!(attempt, "connecting to postgres");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.acquire_timeout)
                .connect_with(config.connect_options.clone())
                .await?;
            sqlx::query("SELECT 1").execute(&pool).await?;
            Ok::<_, sqlx::Error>(pool)
        })
        .await
        .map_err(|source| StorageError::ConnectExhausted {
            attempts: policy.attempts(),
            source,
        })?;

        tracing::info!("connected to postgres");
        Ok(Self { pool })
    }

    /// Connects per [`PostgresGateway::connect`] and then ensures the
    /// schema. No table is created unless the connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectExhausted`] when the retry budget runs
    /// out, or [`StorageError::Database`] if schema creation fails.
    pub async fn bootstrap(config: &StoreConfig) -> Result<Self, StorageError> {
        let gateway = Self::connect(config).await?;
        gateway.ensure_schema().await?;
        Ok(gateway)
    }

    /// Creates both tables if they do not exist. Safe to call on every
    /// startup.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if a statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        for statement in [CREATE_PRIMARY, CREATE_SECONDARY] {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(
            primary = PRIMARY_TABLE,
            secondary = SECONDARY_TABLE,
            "tables ensured"
        );
        Ok(())
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loads every primary row ordered by `record_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] on query failure.
    pub async fn primary_rows(&self) -> Result<Vec<EventRecord>, StorageError> {
        self.load_rows("SELECT user_id, payment_id, deposit_amount FROM payment_events ORDER BY payment_id")
            .await
    }

    /// Loads every secondary row ordered by `record_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] on query failure.
    pub async fn secondary_rows(&self) -> Result<Vec<EventRecord>, StorageError> {
        self.load_rows("SELECT user_id, payment_id, deposit_amount FROM skipped_messages ORDER BY payment_id")
            .await
    }

    async fn load_rows(&self, sql: &str) -> Result<Vec<EventRecord>, StorageError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64)>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(owner_id, record_id, amount)| EventRecord::new(owner_id, record_id, amount))
            .collect())
    }
}

impl RecordStore for PostgresGateway {
    async fn insert_primary(&self, record: &EventRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO payment_events (user_id, payment_id, deposit_amount) VALUES ($1, $2, $3)",
        )
        .bind(record.owner_id)
        .bind(record.record_id)
        .bind(record.amount)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::DuplicateKey {
                    record_id: record.record_id,
                }
            } else {
                StorageError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn insert_secondary(&self, record: &EventRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO skipped_messages (user_id, payment_id, deposit_amount) VALUES ($1, $2, $3)",
        )
        .bind(record.owner_id)
        .bind(record.record_id)
        .bind(record.amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
