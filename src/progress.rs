//! Progress-callback trait for migration events.
//!
//! Inject an [`Arc<dyn MigrationProgressCallback>`] via
//! [`crate::config::MigrationConfigBuilder::progress_callback`] to receive
//! progress percentages, human-readable status lines and per-job completion
//! as the pipeline runs. The pipeline never interprets what the callback does
//! with them.
//!
//! Front ends that live on another task can use [`ChannelProgressCallback`],
//! which turns every call into a [`MigrationEvent`] on an unbounded channel so
//! the pipeline never waits on rendering.
//!
//! # Example
//!
//! ```rust
//! use json_image_migrator::{MigrationConfig, MigrationProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! struct StatusLog(Mutex<Vec<String>>);
//!
//! impl MigrationProgressCallback for StatusLog {
//!     fn on_status(&self, message: &str) {
//!         self.0.lock().unwrap().push(message.to_string());
//!     }
//! }
//!
//! let log = Arc::new(StatusLog(Mutex::new(Vec::new())));
//! let config = MigrationConfig::builder()
//!     .progress_callback(log as Arc<dyn MigrationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Called by the migration pipeline as it works through jobs and images.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls arrive from the pipeline's task, in order.
pub trait MigrationProgressCallback: Send + Sync {
    /// Overall progress of the current job, 0–100.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// A human-readable status line ("Processing image 2 of 5", …).
    fn on_status(&self, message: &str) {
        let _ = message;
    }

    /// The updated document for `source` has been written.
    fn on_job_done(&self, source: &Path) {
        let _ = source;
    }

    /// The job for `source` was abandoned; no output file was written.
    fn on_job_failed(&self, source: &Path, error: &str) {
        let _ = (source, error);
    }

    /// Called once after every job has been attempted.
    ///
    /// # Arguments
    /// * `total_jobs`   — jobs in the run
    /// * `written_jobs` — jobs whose output file was written
    fn on_run_complete(&self, total_jobs: usize, written_jobs: usize) {
        let _ = (total_jobs, written_jobs);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl MigrationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MigrationConfig`].
pub type ProgressCallback = Arc<dyn MigrationProgressCallback>;

/// One notification from the pipeline, as delivered over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    Progress { percent: u8 },
    Status { message: String },
    JobDone { source: PathBuf },
    JobFailed { source: PathBuf, error: String },
    RunComplete { total_jobs: usize, written_jobs: usize },
}

/// Forwards every callback as a [`MigrationEvent`] on an unbounded channel.
///
/// Sending never blocks; events sent after the receiver is dropped are discarded.
pub struct ChannelProgressCallback {
    tx: mpsc::UnboundedSender<MigrationEvent>,
}

impl ChannelProgressCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MigrationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: MigrationEvent) {
        let _ = self.tx.send(event);
    }
}

impl MigrationProgressCallback for ChannelProgressCallback {
    fn on_progress(&self, percent: u8) {
        self.send(MigrationEvent::Progress { percent });
    }

    fn on_status(&self, message: &str) {
        self.send(MigrationEvent::Status {
            message: message.to_string(),
        });
    }

    fn on_job_done(&self, source: &Path) {
        self.send(MigrationEvent::JobDone {
            source: source.to_path_buf(),
        });
    }

    fn on_job_failed(&self, source: &Path, error: &str) {
        self.send(MigrationEvent::JobFailed {
            source: source.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn on_run_complete(&self, total_jobs: usize, written_jobs: usize) {
        self.send(MigrationEvent::RunComplete {
            total_jobs,
            written_jobs,
        });
    }
}

/// Percentage of `done` out of `total`, rounded to the nearest integer.
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_progress(50);
        cb.on_status("Processing image 1 of 2");
        cb.on_job_done(Path::new("a.json"));
        cb.on_job_failed(Path::new("b.json"), "not valid JSON");
        cb.on_run_complete(2, 1);
    }

    #[test]
    fn channel_callback_preserves_order() {
        let (cb, mut rx) = ChannelProgressCallback::new();
        cb.on_status("Processing file: a.json");
        cb.on_progress(33);
        cb.on_job_done(Path::new("/data/a.json"));

        assert_eq!(
            rx.try_recv().unwrap(),
            MigrationEvent::Status {
                message: "Processing file: a.json".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), MigrationEvent::Progress { percent: 33 });
        assert_eq!(
            rx.try_recv().unwrap(),
            MigrationEvent::JobDone {
                source: PathBuf::from("/data/a.json")
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_callback_survives_dropped_receiver() {
        let (cb, rx) = ChannelProgressCallback::new();
        drop(rx);
        cb.on_status("nobody listening");
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn events_serialise_with_tag() {
        let json = serde_json::to_string(&MigrationEvent::Progress { percent: 10 }).unwrap();
        assert_eq!(json, r#"{"event":"progress","percent":10}"#);
    }
}
