//! Postgres-backed store client

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, trace};
use uuid::Uuid;

use super::{NewNotification, NotificationStore, RecordStatus};
use crate::common::config::{validate_table_name, DatabaseConfig};
use crate::common::{millis, Result};

/// Store client over a shared connection pool
///
/// The pool is safe to share between concurrently running scenarios; each
/// read acquires its own connection, so polls never interleave on a cursor.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    status_sql: String,
    table: String,
}

impl PgStore {
    /// Open the pool and prove the store is reachable
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        validate_table_name(&config.table)?;
        info!(table = %config.table, "Connecting to store");
        let start = Instant::now();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!(error = %e, "Store connection failed");
                e
            })?;

        info!(duration_ms = millis(start.elapsed()), "Store connected");

        Ok(Self::from_pool(pool, &config.table))
    }

    /// Wrap an existing pool. The table name must already be validated.
    pub fn from_pool(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            status_sql: format!(
                "SELECT is_processed, COALESCE(error_count, 0) AS error_count, last_error \
                 FROM {} WHERE id = $1",
                table
            ),
            table: table.to_string(),
        }
    }

    /// Build the insert statement, leaving out optional columns that are unset
    /// so the store's own defaults apply
    fn insert_sql(&self, record: &NewNotification) -> String {
        let mut columns = vec!["id", "user_id", "title", "message", "notification_type"];
        if record.priority.is_some() {
            columns.push("priority");
        }
        if record.deliver_at.is_some() {
            columns.push("deliver_at");
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    #[instrument(skip(self, record), fields(notification_id = %record.id))]
    async fn insert(&self, record: &NewNotification) -> Result<Uuid> {
        let sql = self.insert_sql(record);
        trace!(sql = %sql, "Store insert");
        let start = Instant::now();

        let mut query = sqlx::query(&sql)
            .bind(record.id)
            .bind(record.recipient)
            .bind(&record.title)
            .bind(&record.body)
            .bind(&record.category);
        if let Some(priority) = &record.priority {
            query = query.bind(priority);
        }
        if let Some(deliver_at) = record.deliver_at {
            query = query.bind(deliver_at);
        }

        match query.execute(&self.pool).await {
            Ok(_) => {
                debug!(
                    duration_ms = millis(start.elapsed()),
                    broadcast = record.is_broadcast(),
                    scheduled = record.deliver_at.is_some(),
                    "Store insert: completed"
                );
                Ok(record.id)
            }
            Err(e) => {
                error!(
                    duration_ms = millis(start.elapsed()),
                    error = %e,
                    "Store insert: rejected"
                );
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self), fields(notification_id = %id))]
    async fn fetch_status(&self, id: Uuid) -> Result<Option<RecordStatus>> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, RecordStatus>(&self.status_sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(status) => {
                trace!(
                    duration_ms = millis(start.elapsed()),
                    found = status.is_some(),
                    "Store fetch_status: completed"
                );
                Ok(status)
            }
            Err(e) => {
                error!(error = %e, "Store fetch_status: query failed");
                Err(e.into())
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Store pool closed");
    }
}
