//! Reporting agent
//!
//! Polls system statistics on one timer and ships the latest readings to the
//! server on another. A failed report is logged; the readings and the
//! unreported poll count are carried over to the next attempt.

pub mod collector;
pub mod reporter;

pub use collector::Collector;
pub use reporter::Reporter;

use std::future::Future;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::AgentConfig;

/// Run the agent until `shutdown` resolves
pub async fn run_agent(
    config: AgentConfig,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    config.validate()?;

    let mut collector = Collector::new();
    let reporter = Reporter::new(&config.base_url(), config.signer())?;

    info!(
        "reporting to {} every {:?} (polling every {:?})",
        reporter.endpoint(),
        config.report_interval,
        config.poll_interval
    );

    let mut poll = time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut report = time::interval_at(
        Instant::now() + config.report_interval,
        config.report_interval,
    );
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("shutdown requested");
                break;
            }

            _ = poll.tick() => collector.poll(),

            _ = report.tick() => {
                let samples = collector.pending();
                if samples.is_empty() {
                    continue;
                }

                let polls = collector.poll_count();
                match reporter.report(&samples).await {
                    Ok(()) => collector.acknowledge(polls),
                    Err(e) => error!("failed to report metrics: {e}"),
                }
            }
        }
    }

    info!("agent stopped");
    Ok(())
}
