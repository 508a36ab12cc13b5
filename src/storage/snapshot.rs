//! Snapshot file persistence
//!
//! A snapshot is a JSON document shaped like the `GET /` dump:
//!
//! ```json
//! {"Gauge": {"Alloc": 42.0}, "Counter": {"PollCount": 5}}
//! ```
//!
//! Writes go to a sibling temporary file which is then renamed over the
//! target, so a reader sees either the previous snapshot or the new one in
//! full, never a torn file.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::error::StorageResult;
use crate::{MetricSample, MetricValue};

/// Point-in-time copy of every record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Gauge", default)]
    pub gauge: BTreeMap<String, f64>,

    #[serde(rename = "Counter", default)]
    pub counter: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.gauge.len() + self.counter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauge.is_empty() && self.counter.is_empty()
    }

    /// Insert a record; counters are taken as absolute values here
    pub fn insert(&mut self, id: impl Into<String>, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => {
                self.gauge.insert(id.into(), v);
            }
            MetricValue::Counter(d) => {
                self.counter.insert(id.into(), d);
            }
        }
    }

    /// One sample per gauge entry followed by one per counter entry
    pub fn into_samples(self) -> Vec<MetricSample> {
        let gauges = self
            .gauge
            .into_iter()
            .map(|(id, value)| MetricSample::gauge(id, value));
        let counters = self
            .counter
            .into_iter()
            .map(|(id, delta)| MetricSample::counter(id, delta));

        gauges.chain(counters).collect()
    }
}

/// Serialize `snapshot` and atomically replace the file at `path`
#[instrument(skip(snapshot), fields(path = %path.display(), records = snapshot.len()))]
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> StorageResult<()> {
    let payload = serde_json::to_vec(snapshot)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp_path = temporary_path(path)?;
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&payload).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }

    debug!("snapshot written ({} bytes)", payload.len());
    Ok(())
}

/// Read the snapshot at `path` back into samples
///
/// A missing or empty (whitespace only) file yields no samples.
#[instrument(fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> StorageResult<Vec<MetricSample>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("no snapshot file present");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    if raw.iter().all(u8::is_ascii_whitespace) {
        debug!("snapshot file is empty");
        return Ok(Vec::new());
    }

    let snapshot: Snapshot = serde_json::from_slice(&raw)?;
    debug!("read {} records from snapshot", snapshot.len());
    Ok(snapshot.into_samples())
}

fn temporary_path(path: &Path) -> io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("snapshot path {} has no file name", path.display()),
        )
    })?;

    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}
