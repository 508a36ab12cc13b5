//! Relational storage backend
//!
//! Works against any database sqlx's `Any` driver knows about; the server
//! targets PostgreSQL, the tests run on SQLite files.
//!
//! ## Connection
//!
//! [`connect`] is the only retried operation: it makes up to
//! `max_attempts` attempts with a fixed pause in between and reports either
//! [`ConnectOutcome::Connected`] or [`ConnectOutcome::Exhausted`] with the
//! last error. Everything after that surfaces errors to the caller directly.
//!
//! ## Writes
//!
//! `upsert_one` and `upsert_batch` are raw last-write-wins writes keyed by
//! id. Ingestion goes through the [`MetricStorage`] impl instead: every
//! sample is one `INSERT .. ON CONFLICT DO UPDATE` that adds counter deltas in
//! SQL and reads the result back with `RETURNING`, so concurrent writers never
//! lose an increment. The update is guarded by the stored kind; a sample
//! whose id is already stored under the other kind is rejected.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, Executor, Statement, Transaction};
use tracing::{debug, info, instrument, warn};

use super::backend::{MetricStorage, RetryPolicy};
use super::error::{StorageError, StorageResult};
use super::schema::{
    ACCUMULATE_METRIC, CREATE_METRICS_TABLE, MetricRow, SELECT_ALL_METRICS, SELECT_METRIC,
    UPSERT_METRIC,
};
use super::snapshot::Snapshot;
use crate::{MetricKind, MetricSample, MetricValue};

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of the bounded connection loop
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(AnyPool),
    Exhausted(StorageError),
}

/// Open a connection pool, retrying according to `policy`
#[instrument(skip(dsn), fields(attempts = policy.max_attempts))]
pub async fn connect(dsn: &str, policy: &RetryPolicy) -> ConnectOutcome {
    sqlx::any::install_default_drivers();

    let attempts = policy.max_attempts.max(1);
    let mut last_error = StorageError::ConnectionFailed("no attempt made".to_string());

    for attempt in 1..=attempts {
        let result = AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await;

        match result {
            Ok(pool) => {
                info!("connected to database (attempt {attempt}/{attempts})");
                return ConnectOutcome::Connected(pool);
            }
            Err(e) => {
                warn!("database connection attempt {attempt}/{attempts} failed: {e}");
                last_error = StorageError::ConnectionFailed(e.to_string());
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    ConnectOutcome::Exhausted(last_error)
}

/// Metric storage backed by the `metrics` table
#[derive(Debug, Clone)]
pub struct DatabaseStorage {
    pool: AnyPool,
}

impl DatabaseStorage {
    /// Connect with retry and make sure the table exists
    pub async fn connect(dsn: &str, policy: &RetryPolicy) -> StorageResult<Self> {
        match connect(dsn, policy).await {
            ConnectOutcome::Connected(pool) => {
                let storage = Self::from_pool(pool);
                storage.ensure_schema().await?;
                Ok(storage)
            }
            ConnectOutcome::Exhausted(err) => Err(err),
        }
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Create the `metrics` table if it does not exist yet
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        self.pool.execute(CREATE_METRICS_TABLE).await?;
        debug!("metrics table ready");
        Ok(())
    }

    /// Insert or fully replace the row for `sample.id`
    #[instrument(skip(self, sample), fields(id = %sample.id))]
    pub async fn upsert_one(&self, sample: &MetricSample) -> StorageResult<()> {
        sample.validate()?;
        let row = MetricRow::from(sample);

        sqlx::query(UPSERT_METRIC)
            .bind(row.id)
            .bind(row.metric_type.to_string())
            .bind(row.delta)
            .bind(row.value)
            .bind(row.hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Upsert every sample inside one transaction
    ///
    /// A single prepared statement is reused for all rows. The first row
    /// that fails (validation or query) rolls the whole batch back.
    #[instrument(skip(self, samples), fields(count = samples.len()))]
    pub async fn upsert_batch(&self, samples: &[MetricSample]) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        write_rows(&mut tx, samples).await?;
        tx.commit().await?;

        debug!("batch upsert committed");
        Ok(())
    }

    /// Point lookup by id and kind
    #[instrument(skip(self))]
    pub async fn select_one(&self, id: &str, kind: MetricKind) -> StorageResult<MetricSample> {
        let row = sqlx::query(SELECT_METRIC)
            .bind(id)
            .bind(kind.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found(id, kind))?;

        let row = MetricRow::from_any_row(&row)?;
        Ok(MetricSample::try_from(row)?)
    }
}

/// Replace the rows of `samples` through one prepared statement on the open
/// transaction
///
/// Each sample is validated right before its row is written, so an invalid
/// sample anywhere aborts the batch with the earlier rows still uncommitted.
async fn write_rows(
    tx: &mut Transaction<'static, Any>,
    samples: &[MetricSample],
) -> StorageResult<()> {
    let statement = (&mut **tx).prepare(UPSERT_METRIC).await?;

    for sample in samples {
        sample.validate()?;
        let row = MetricRow::from(sample);

        statement
            .query()
            .bind(row.id)
            .bind(row.metric_type.to_string())
            .bind(row.delta)
            .bind(row.value)
            .bind(row.hash)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Apply `samples` with kind semantics through one prepared statement on the
/// open transaction
///
/// The first invalid or conflicting sample aborts the batch.
async fn accumulate_rows(
    tx: &mut Transaction<'static, Any>,
    samples: &[MetricSample],
) -> StorageResult<()> {
    let statement = (&mut **tx).prepare(ACCUMULATE_METRIC).await?;

    for sample in samples {
        sample.validate()?;
        let row = MetricRow::from(sample);

        let stored = statement
            .query()
            .bind(row.id)
            .bind(row.metric_type.to_string())
            .bind(row.delta)
            .bind(row.value)
            .bind(row.hash)
            .fetch_optional(&mut **tx)
            .await?;

        if stored.is_none() {
            return Err(StorageError::kind_conflict(&sample.id, sample.kind()));
        }
    }

    Ok(())
}

#[async_trait]
impl MetricStorage for DatabaseStorage {
    async fn add_gauge(&self, id: &str, value: f64) -> StorageResult<()> {
        self.record(&MetricSample::gauge(id, value)).await.map(|_| ())
    }

    async fn add_counter(&self, id: &str, delta: i64) -> StorageResult<()> {
        self.record(&MetricSample::counter(id, delta)).await.map(|_| ())
    }

    async fn get_gauge(&self, id: &str) -> StorageResult<f64> {
        match self.select_one(id, MetricKind::Gauge).await?.value {
            MetricValue::Gauge(value) => Ok(value),
            MetricValue::Counter(_) => Err(StorageError::not_found(id, MetricKind::Gauge)),
        }
    }

    async fn get_counter(&self, id: &str) -> StorageResult<i64> {
        match self.select_one(id, MetricKind::Counter).await?.value {
            MetricValue::Counter(delta) => Ok(delta),
            MetricValue::Gauge(_) => Err(StorageError::not_found(id, MetricKind::Counter)),
        }
    }

    #[instrument(skip(self))]
    async fn snapshot(&self) -> StorageResult<Snapshot> {
        let rows = sqlx::query(SELECT_ALL_METRICS)
            .fetch_all(&self.pool)
            .await?;

        let mut snapshot = Snapshot::default();
        for row in &rows {
            let sample = MetricSample::try_from(MetricRow::from_any_row(row)?)?;
            snapshot.insert(sample.id, sample.value);
        }

        debug!("table scan returned {} records", snapshot.len());
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "database"
    }

    /// One atomic write; the stored value comes back from `RETURNING`
    #[instrument(skip(self, sample), fields(id = %sample.id, kind = %sample.kind()))]
    async fn record(&self, sample: &MetricSample) -> StorageResult<MetricValue> {
        sample.validate()?;
        let row = MetricRow::from(sample);

        let stored = sqlx::query(ACCUMULATE_METRIC)
            .bind(row.id)
            .bind(row.metric_type.to_string())
            .bind(row.delta)
            .bind(row.value)
            .bind(row.hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::kind_conflict(&sample.id, sample.kind()))?;

        MetricRow::returned_value(&sample.id, sample.kind(), &stored)
    }

    /// Apply every sample inside one transaction
    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn record_batch(&self, samples: &[MetricSample]) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        accumulate_rows(&mut tx, samples).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing database pool");
        self.pool.close().await;
        Ok(())
    }
}
