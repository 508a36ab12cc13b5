//! Periodic sampling of OS memory and CPU statistics

use sysinfo::System;
use tracing::trace;

use crate::MetricSample;

/// Counter reporting how many polls happened since the last report
pub const POLL_COUNT: &str = "PollCount";

/// Holds the latest readings between two reports
pub struct Collector {
    system: System,
    gauges: Vec<MetricSample>,
    poll_count: i64,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            gauges: Vec::new(),
            poll_count: 0,
        }
    }

    /// Refresh the statistics and replace the previous readings
    pub fn poll(&mut self) {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        self.gauges = system_gauges(&self.system);
        self.poll_count += 1;
        trace!("poll #{} collected {} gauges", self.poll_count, self.gauges.len());
    }

    /// Samples to send on the next report
    ///
    /// Empty until the first poll.
    pub fn pending(&self) -> Vec<MetricSample> {
        if self.poll_count == 0 && self.gauges.is_empty() {
            return Vec::new();
        }

        let mut samples = self.gauges.clone();
        samples.push(MetricSample::counter(POLL_COUNT, self.poll_count));
        samples
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Forget `reported` polls after they reached the server
    pub fn acknowledge(&mut self, reported: i64) {
        self.poll_count = self.poll_count.saturating_sub(reported).max(0);
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

fn system_gauges(system: &System) -> Vec<MetricSample> {
    let mut gauges = vec![
        MetricSample::gauge("TotalMemory", system.total_memory() as f64),
        MetricSample::gauge("UsedMemory", system.used_memory() as f64),
        MetricSample::gauge("FreeMemory", system.free_memory() as f64),
        MetricSample::gauge("AvailableMemory", system.available_memory() as f64),
        MetricSample::gauge("TotalSwap", system.total_swap() as f64),
        MetricSample::gauge("UsedSwap", system.used_swap() as f64),
    ];

    gauges.extend(system.cpus().iter().enumerate().map(|(n, cpu)| {
        MetricSample::gauge(format!("CPUutilization{}", n + 1), f64::from(cpu.cpu_usage()))
    }));

    gauges
}
