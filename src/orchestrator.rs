//! Restore and flush orchestration
//!
//! Drives the persistence lifecycle of the in-memory store:
//!
//! 1. `Starting`
//! 2. `Restoring` (only if enabled): read the snapshot file and replay each
//!    sample into the store. An unreadable file leaves the store empty; a
//!    sample that fails to replay is logged and skipped.
//! 3. `Running`: the [`FlushActor`](crate::actors::FlushActor) owns the
//!    lifecycle from here on and writes snapshots until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::MetricSample;
use crate::actors::{FlushHandle, Lifecycle};
use crate::storage::{MetricStorage, read_snapshot};

/// Snapshot persistence settings for the memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    pub snapshot_path: PathBuf,

    /// Flush period; zero selects write-through mode
    pub interval: Duration,

    /// Replay the snapshot file on startup
    pub restore: bool,
}

impl PersistenceSettings {
    pub fn write_through(&self) -> bool {
        self.interval.is_zero()
    }
}

/// Outcome of a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Samples written into the store
    pub replayed: usize,

    /// Samples the store rejected
    pub failed: usize,
}

pub struct Orchestrator {
    storage: Arc<dyn MetricStorage>,
    settings: PersistenceSettings,
    lifecycle: Arc<watch::Sender<Lifecycle>>,
}

impl Orchestrator {
    pub fn new(storage: Arc<dyn MetricStorage>, settings: PersistenceSettings) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Starting);

        Self {
            storage,
            settings,
            lifecycle: Arc::new(lifecycle),
        }
    }

    pub fn settings(&self) -> &PersistenceSettings {
        &self.settings
    }

    /// Watch the persistence lifecycle
    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Replay the snapshot file into the store if restore is enabled
    #[instrument(skip(self), fields(path = %self.settings.snapshot_path.display()))]
    pub async fn restore(&self) -> RestoreReport {
        if !self.settings.restore {
            debug!("restore disabled");
            return RestoreReport::default();
        }

        self.lifecycle.send_replace(Lifecycle::Restoring);

        let samples = match read_snapshot(&self.settings.snapshot_path).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!("cannot read snapshot, starting with an empty store: {e}");
                Vec::new()
            }
        };

        let report = replay(self.storage.as_ref(), samples).await;
        info!(
            "restored {} records ({} failed)",
            report.replayed, report.failed
        );
        report
    }

    /// Start the flush actor and hand the lifecycle over to it
    pub fn start(self) -> FlushHandle {
        let interval = if self.settings.write_through() {
            info!("snapshot write-through enabled");
            None
        } else {
            Some(self.settings.interval)
        };

        self.lifecycle.send_replace(Lifecycle::Running);

        FlushHandle::spawn(
            self.storage,
            self.settings.snapshot_path,
            interval,
            self.lifecycle,
        )
    }
}

/// Write every sample into `storage` with the semantics of its kind
pub async fn replay(storage: &dyn MetricStorage, samples: Vec<MetricSample>) -> RestoreReport {
    let mut report = RestoreReport::default();

    for sample in samples {
        match storage.record(&sample).await {
            Ok(_) => report.replayed += 1,
            Err(e) => {
                warn!("failed to replay {} {}: {e}", sample.kind(), sample.id);
                report.failed += 1;
            }
        }
    }

    report
}
