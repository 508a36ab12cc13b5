//! FlushActor - writes store snapshots to disk
//!
//! ## Triggers
//!
//! - **Periodic**: every `interval`, independent of request handling
//! - **Write-through**: with a zero interval the actor instead waits for
//!   [`FlushHandle::request_flush`] calls. Requests arriving while a write is
//!   in progress collapse into one follow-up write.
//! - **Manual**: [`FlushHandle::flush`] writes immediately and reports the result
//! - **Shutdown**: one final best-effort write before the actor stops
//!
//! The snapshot is copied out of the store first; serialization and file I/O
//! happen afterwards without holding the store lock.
//!
//! Failed writes are logged and counted; the next trigger simply tries again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{FlushCommand, FlushStats, Lifecycle};
use crate::storage::{MetricStorage, StorageResult, write_snapshot};

/// Snapshot writer actor
pub struct FlushActor {
    storage: Arc<dyn MetricStorage>,

    /// Snapshot file location
    path: PathBuf,

    /// Timer period, `None` in write-through mode
    interval: Option<Duration>,

    command_rx: mpsc::Receiver<FlushCommand>,

    /// Signalled by ingestion in write-through mode
    write_through: Arc<Notify>,

    lifecycle: Arc<watch::Sender<Lifecycle>>,

    stats: FlushStats,
}

impl FlushActor {
    pub fn new(
        storage: Arc<dyn MetricStorage>,
        path: PathBuf,
        interval: Option<Duration>,
        command_rx: mpsc::Receiver<FlushCommand>,
        write_through: Arc<Notify>,
        lifecycle: Arc<watch::Sender<Lifecycle>>,
    ) -> Self {
        Self {
            storage,
            path,
            interval,
            command_rx,
            write_through,
            lifecycle,
            stats: FlushStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn run(mut self) {
        let periodic = self.interval.is_some();
        match self.interval {
            Some(interval) => debug!("starting flush actor (every {interval:?})"),
            None => debug!("starting flush actor (write-through)"),
        }

        // The timer is still built in write-through mode; its branch is disabled
        let period = self.interval.unwrap_or(Duration::from_secs(3600));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let write_through = self.write_through.clone();
        let mut shutdown_reply = None;

        loop {
            tokio::select! {
                _ = ticker.tick(), if periodic => {
                    trace!("periodic flush triggered");
                    let _ = self.tracked_flush().await;
                }

                _ = write_through.notified(), if !periodic => {
                    trace!("write-through flush triggered");
                    let _ = self.tracked_flush().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(FlushCommand::Shutdown { respond_to }) => {
                            shutdown_reply = Some(respond_to);
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.lifecycle.send_replace(Lifecycle::ShuttingDown);

        debug!("final flush before shutdown");
        if self.flush().await.is_ok() {
            info!("final snapshot written to {}", self.path.display());
        }

        self.lifecycle.send_replace(Lifecycle::Stopped);

        if let Some(respond_to) = shutdown_reply {
            let _ = respond_to.send(self.stats.clone());
        }

        debug!("flush actor stopped");
    }

    /// Flush with the lifecycle moved to `Flushing` for the duration
    async fn tracked_flush(&mut self) -> StorageResult<()> {
        self.lifecycle.send_replace(Lifecycle::Flushing);
        let result = self.flush().await;
        self.lifecycle.send_replace(Lifecycle::Running);
        result
    }

    /// Copy the store, write it out and update the statistics
    async fn flush(&mut self) -> StorageResult<()> {
        let result = match self.storage.snapshot().await {
            Ok(snapshot) => {
                let records = snapshot.len();
                write_snapshot(&self.path, &snapshot).await.map(|_| records)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(records) => {
                self.stats.flush_count += 1;
                self.stats.last_flush = Some(Utc::now());
                self.stats.last_records = records;
                trace!("flush #{} complete ({records} records)", self.stats.flush_count);
                Ok(())
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                error!("failed to write snapshot to {}: {e}", self.path.display());
                Err(e)
            }
        }
    }

    async fn handle_command(&mut self, cmd: FlushCommand) {
        match cmd {
            FlushCommand::Flush { respond_to } => {
                debug!("manual flush requested");
                let result = self.tracked_flush().await;
                let _ = respond_to.send(result);
            }

            FlushCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats.clone());
            }

            // Handled by the run loop
            FlushCommand::Shutdown { respond_to } => {
                let _ = respond_to.send(self.stats.clone());
            }
        }
    }
}

/// Handle for controlling the FlushActor
#[derive(Clone)]
pub struct FlushHandle {
    sender: mpsc::Sender<FlushCommand>,
    notify: Arc<Notify>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl FlushHandle {
    /// Spawn a new flush actor
    ///
    /// `interval == None` selects write-through mode.
    pub fn spawn(
        storage: Arc<dyn MetricStorage>,
        path: PathBuf,
        interval: Option<Duration>,
        lifecycle: Arc<watch::Sender<Lifecycle>>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let notify = Arc::new(Notify::new());
        let receiver = lifecycle.subscribe();

        let actor = FlushActor::new(storage, path, interval, cmd_rx, notify.clone(), lifecycle);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            notify,
            lifecycle: receiver,
        }
    }

    /// Write a snapshot now and wait for the outcome
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(FlushCommand::Flush { respond_to: tx }).await?;

        rx.await??;
        Ok(())
    }

    /// Ask for a write-through flush without waiting for it
    pub fn request_flush(&self) {
        self.notify.notify_one();
    }

    /// Get flush statistics
    pub async fn get_stats(&self) -> Option<FlushStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FlushCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Stop the actor after its final flush
    ///
    /// Returns `None` if the actor was already gone.
    pub async fn shutdown(&self) -> Option<FlushStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FlushCommand::Shutdown { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Watch the persistence lifecycle
    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.clone()
    }
}
