//! Periodic partial-report snapshots
//!
//! A checkpoint is a JSON `RunReport` with `finalized: false`. Each write goes
//! to a sibling temp file that is then renamed over the target, so a reader
//! never sees a half-written file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{Aggregator, RunReport};
use crate::error::ProbeError;

/// Writes report snapshots to one path
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
    interval: Duration,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(Duration::from_millis(100)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Write one snapshot atomically
    pub fn write(&self, report: &RunReport) -> Result<(), ProbeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, super::formats::json::generate(report)?)?;
        std::fs::rename(&temp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            records = report.records.len(),
            "Checkpoint written"
        );
        Ok(())
    }

    /// Load a checkpoint back
    pub fn load(path: &Path) -> Result<RunReport, ProbeError> {
        let json = std::fs::read_to_string(path)?;
        RunReport::from_json(&json)
    }

    /// Write a finished report on the blocking pool
    pub async fn persist(&self, report: RunReport) -> Result<(), ProbeError> {
        self.off_runtime(move |checkpointer| checkpointer.write(&report))
            .await
    }

    /// Snapshot the aggregator and write it, both on the blocking pool, so
    /// cloning records under the aggregator lock never stalls a runtime thread
    async fn write_snapshot(&self, aggregator: &Arc<Aggregator>) -> Result<(), ProbeError> {
        let aggregator = aggregator.clone();
        self.off_runtime(move |checkpointer| checkpointer.write(&aggregator.snapshot()))
            .await
    }

    async fn off_runtime<F>(&self, job: F) -> Result<(), ProbeError>
    where
        F: FnOnce(&Checkpointer) -> Result<(), ProbeError> + Send + 'static,
    {
        let checkpointer = self.clone();
        tokio::task::spawn_blocking(move || job(&checkpointer))
            .await
            .map_err(|e| ProbeError::Io(std::io::Error::other(e)))?
    }

    /// Snapshot the aggregator every interval until the task is finished
    pub fn spawn(self, aggregator: Arc<Aggregator>) -> CheckpointTask {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.write_snapshot(&aggregator).await {
                            tracing::warn!(error = %e, path = %self.path.display(), "Checkpoint failed");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        CheckpointTask { shutdown, handle }
    }
}

/// Handle to a running checkpoint loop
pub struct CheckpointTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl CheckpointTask {
    /// Stop the loop and wait for it to exit
    pub async fn finish(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Checkpoint task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ModuleKind;
    use crate::reporting::test_support::{response, sample_report, spec};

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("nested/run.json"), Duration::from_secs(1));
        let report = sample_report();

        checkpointer.write(&report).unwrap();

        assert!(!checkpointer.temp_path().exists());
        assert_eq!(Checkpointer::load(checkpointer.path()).unwrap(), report);
    }

    #[tokio::test]
    async fn test_periodic_snapshots_are_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let aggregator = Arc::new(Aggregator::new(ModuleKind::Brute, "http://test.local/login"));
        let s = spec(0, "a");
        aggregator.record(s.clone(), response(&s, 401), vec![]).unwrap();

        let task = Checkpointer::new(&path, Duration::from_millis(100)).spawn(aggregator.clone());
        tokio::time::sleep(Duration::from_millis(350)).await;
        task.finish().await;

        let saved = Checkpointer::load(&path).unwrap();
        assert!(!saved.metadata.finalized);
        assert_eq!(saved.summary.attempted, 1);
        assert!(!aggregator.is_finalized());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_persist_writes_final_report() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("final.json"), Duration::from_secs(1));
        let report = sample_report();

        checkpointer.persist(report.clone()).await.unwrap();

        assert_eq!(Checkpointer::load(checkpointer.path()).unwrap(), report);
        assert!(!checkpointer.temp_path().exists());
    }
}
