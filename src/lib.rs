pub mod actors;
pub mod agent;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod orchestrator;
pub mod signing;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two supported metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last reported absolute reading wins
    Gauge,

    /// Reported deltas are summed up
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(SampleError::UnknownKind(other.to_string())),
        }
    }
}

/// Value carried by a sample, tagged with its kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// A single measurement as reported by an agent
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub id: String,
    pub value: MetricValue,
    pub hash: Option<String>,
}

impl MetricSample {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Build a sample from the raw segments of `/update/{kind}/{id}/{value}`.
    ///
    /// The kind is checked first so that an unknown kind is always reported as
    /// such, even when the value would not parse either. Counter deltas must be
    /// integral.
    pub fn parse(kind: &str, id: &str, raw: &str) -> Result<Self, SampleError> {
        let kind: MetricKind = kind.parse()?;
        let invalid = || SampleError::InvalidValue {
            kind,
            value: raw.to_string(),
        };

        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(raw.parse().map_err(|_| invalid())?),
            MetricKind::Counter => MetricValue::Counter(raw.parse().map_err(|_| invalid())?),
        };

        let sample = Self {
            id: id.to_string(),
            value,
            hash: None,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Reject samples that could never round-trip through a snapshot or the
    /// relational backend.
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.id.is_empty() {
            return Err(SampleError::EmptyId);
        }

        if let MetricValue::Gauge(value) = self.value
            && !value.is_finite()
        {
            return Err(SampleError::InvalidValue {
                kind: MetricKind::Gauge,
                value: value.to_string(),
            });
        }

        Ok(())
    }
}

/// Errors raised while turning wire data into a [`MetricSample`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("metric id must not be empty")]
    EmptyId,

    #[error("invalid value {value:?} for {kind} metric")]
    InvalidValue { kind: MetricKind, value: String },

    #[error("{id} is already stored as a {existing} metric")]
    KindConflict { id: String, existing: MetricKind },

    #[error("{kind} metric {id} is missing its {field}")]
    MissingValue {
        id: String,
        kind: MetricKind,
        field: &'static str,
    },
}

/// JSON representation of a sample as exchanged between agent and server
///
/// Gauges carry `value`, counters carry `delta`. `hash` is the hex encoded
/// HMAC tag when the agent signs its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,

    #[serde(rename = "type")]
    pub mtype: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl MetricPayload {
    /// Payload describing the current value of a record (no hash)
    pub fn from_value(id: &str, value: MetricValue) -> Self {
        let (delta, value_field) = match value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };

        Self {
            id: id.to_string(),
            mtype: value.kind().to_string(),
            delta,
            value: value_field,
            hash: None,
        }
    }
}

impl From<&MetricSample> for MetricPayload {
    fn from(sample: &MetricSample) -> Self {
        let mut payload = MetricPayload::from_value(&sample.id, sample.value);
        payload.hash = sample.hash.clone();
        payload
    }
}

impl TryFrom<MetricPayload> for MetricSample {
    type Error = SampleError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        let kind: MetricKind = payload.mtype.parse()?;

        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(payload.value.ok_or_else(|| {
                SampleError::MissingValue {
                    id: payload.id.clone(),
                    kind,
                    field: "value",
                }
            })?),
            MetricKind::Counter => MetricValue::Counter(payload.delta.ok_or_else(|| {
                SampleError::MissingValue {
                    id: payload.id.clone(),
                    kind,
                    field: "delta",
                }
            })?),
        };

        let sample = MetricSample {
            id: payload.id,
            value,
            hash: payload.hash,
        };
        sample.validate()?;
        Ok(sample)
    }
}
