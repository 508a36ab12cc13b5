//! Request and response types for the API

use serde::{Deserialize, Serialize};

pub use crate::MetricPayload;

/// Body of `POST /value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: String,

    #[serde(rename = "type")]
    pub mtype: String,
}
