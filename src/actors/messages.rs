//! Message types for actor communication
//!
//! Commands travel over an mpsc channel to a single actor; each carries a
//! oneshot `respond_to` sender for the reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::storage::StorageResult;

/// Commands that can be sent to the FlushActor
#[derive(Debug)]
pub enum FlushCommand {
    /// Write a snapshot now, bypassing the timer
    Flush {
        respond_to: oneshot::Sender<StorageResult<()>>,
    },

    /// Get flush statistics
    GetStats {
        respond_to: oneshot::Sender<FlushStats>,
    },

    /// Stop the actor after one final flush
    ///
    /// The reply carries the statistics including that final flush.
    Shutdown {
        respond_to: oneshot::Sender<FlushStats>,
    },
}

/// Flush statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushStats {
    /// Number of successful snapshot writes
    pub flush_count: u64,

    /// Number of snapshot writes that failed
    pub failed_flushes: u64,

    /// Completion time of the last successful write
    pub last_flush: Option<DateTime<Utc>>,

    /// Records contained in the last successful write
    pub last_records: usize,
}

/// Persistence lifecycle of the server process
///
/// ```text
/// Starting -> Restoring -> Running <-> Flushing -> ShuttingDown -> Stopped
/// ```
///
/// `Restoring` is skipped when restore is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Starting,
    Restoring,
    Running,
    Flushing,
    ShuttingDown,
    Stopped,
}
