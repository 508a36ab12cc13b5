//! Relational schema and row mapping
//!
//! One row per metric id. The `type` column tells which of `delta` or
//! `value` is populated; the other stays NULL.
//!
//! ```sql
//! metrics(id TEXT PRIMARY KEY, type TEXT, delta BIGINT, value DOUBLE PRECISION, hash TEXT)
//! ```
//!
//! Statements use `$n` placeholders, which both PostgreSQL and SQLite accept.

use serde::{Deserialize, Serialize};

use crate::{MetricKind, MetricSample, MetricValue, SampleError};

pub const CREATE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    delta BIGINT,
    value DOUBLE PRECISION,
    hash TEXT
)
"#;

pub const UPSERT_METRIC: &str = r#"
INSERT INTO metrics (id, type, delta, value, hash)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (id) DO UPDATE SET
    type = excluded.type,
    delta = excluded.delta,
    value = excluded.value,
    hash = excluded.hash
"#;

/// Ingestion write: gauges replace `value`, counters add to `delta`
///
/// The update only applies when the stored row has the same kind. A row of
/// the other kind is left untouched and nothing is returned.
pub const ACCUMULATE_METRIC: &str = r#"
INSERT INTO metrics (id, type, delta, value, hash)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (id) DO UPDATE SET
    delta = metrics.delta + excluded.delta,
    value = excluded.value,
    hash = excluded.hash
WHERE metrics.type = excluded.type
RETURNING delta, value
"#;

pub const SELECT_METRIC: &str =
    "SELECT id, type, delta, value, hash FROM metrics WHERE id = $1 AND type = $2";

pub const SELECT_ALL_METRICS: &str = "SELECT id, type, delta, value, hash FROM metrics";

/// A single row of the `metrics` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub id: String,

    /// Stored in the `type` column
    pub metric_type: MetricKind,

    /// Populated for counters
    pub delta: Option<i64>,

    /// Populated for gauges
    pub value: Option<f64>,

    pub hash: Option<String>,
}

impl From<&MetricSample> for MetricRow {
    fn from(sample: &MetricSample) -> Self {
        let (delta, value) = match sample.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };

        Self {
            id: sample.id.clone(),
            metric_type: sample.kind(),
            delta,
            value,
            hash: sample.hash.clone(),
        }
    }
}

impl TryFrom<MetricRow> for MetricSample {
    type Error = SampleError;

    fn try_from(row: MetricRow) -> Result<Self, Self::Error> {
        let missing = |field: &'static str| SampleError::MissingValue {
            id: row.id.clone(),
            kind: row.metric_type,
            field,
        };

        let value = match row.metric_type {
            MetricKind::Gauge => MetricValue::Gauge(row.value.ok_or_else(|| missing("value"))?),
            MetricKind::Counter => MetricValue::Counter(row.delta.ok_or_else(|| missing("delta"))?),
        };

        Ok(MetricSample {
            id: row.id,
            value,
            hash: row.hash,
        })
    }
}

impl MetricRow {
    /// Value after an [`ACCUMULATE_METRIC`] write, read from its `RETURNING` row
    pub fn returned_value(
        id: &str,
        kind: MetricKind,
        row: &sqlx::any::AnyRow,
    ) -> crate::storage::StorageResult<MetricValue> {
        use sqlx::Row;

        let missing = |field: &'static str| SampleError::MissingValue {
            id: id.to_string(),
            kind,
            field,
        };

        let value = match kind {
            MetricKind::Gauge => {
                let value: Option<f64> = row.try_get("value")?;
                MetricValue::Gauge(value.ok_or_else(|| missing("value"))?)
            }
            MetricKind::Counter => {
                let delta: Option<i64> = row.try_get("delta")?;
                MetricValue::Counter(delta.ok_or_else(|| missing("delta"))?)
            }
        };

        Ok(value)
    }

    /// Decode a row fetched through the `Any` driver
    pub fn from_any_row(row: &sqlx::any::AnyRow) -> crate::storage::StorageResult<Self> {
        use sqlx::Row;

        let metric_type: String = row.try_get("type")?;

        Ok(Self {
            id: row.try_get("id")?,
            metric_type: metric_type.parse()?,
            delta: row.try_get("delta")?,
            value: row.try_get("value")?,
            hash: row.try_get("hash")?,
        })
    }
}
