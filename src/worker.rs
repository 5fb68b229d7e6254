//! Background execution: one run at a time, events over a channel.
//!
//! A front end calls [`MigrationWorker::start`] once and gets a
//! [`MigrationHandle`] back immediately. The pipeline runs on its own tokio
//! task and reports through an unbounded channel, so a slow renderer never
//! holds up an upload. While a run is active, further `start` calls fail
//! with [`MigrateError::AlreadyRunning`]; the busy flag is cleared when the
//! run's task ends, however it ends.
//!
//! There is no cancellation. Dropping the handle detaches the run; it keeps
//! going and its events are discarded.

use crate::config::MigrationConfig;
use crate::error::MigrateError;
use crate::migrate::{MigrationSummary, Migrator};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::input::MigrationJob;
use crate::pipeline::throttle::{FixedDelay, UploadThrottle};
use crate::progress::{
    ChannelProgressCallback, MigrationEvent, MigrationProgressCallback, ProgressCallback,
};
use crate::store::BlobStore;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of pipeline events; ends when the run finishes.
pub type EventStream = Pin<Box<dyn Stream<Item = MigrationEvent> + Send>>;

/// Owns the pipeline's capabilities and runs at most one migration at a time.
pub struct MigrationWorker {
    config: MigrationConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn BlobStore>,
    throttle: Arc<dyn UploadThrottle>,
    busy: Arc<AtomicBool>,
}

impl MigrationWorker {
    pub fn new(
        config: MigrationConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let throttle = Arc::new(FixedDelay::from_millis(config.upload_delay_ms));
        Self {
            config,
            fetcher,
            store,
            throttle,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<dyn UploadThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// `true` while a started run has not finished.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start migrating `jobs` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// [`MigrateError::AlreadyRunning`] if a previous run is still active.
    pub fn start(&self, jobs: Vec<MigrationJob>) -> Result<MigrationHandle, MigrateError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MigrateError::AlreadyRunning);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let (channel, events) = ChannelProgressCallback::new();
        let mut config = self.config.clone();
        let forward: ProgressCallback = Arc::new(Fanout {
            channel,
            inner: config.progress_callback.take(),
        });
        config.progress_callback = Some(forward);

        let migrator = Migrator::new(config, Arc::clone(&self.fetcher), Arc::clone(&self.store))
            .with_throttle(Arc::clone(&self.throttle));

        info!("Starting background run over {} file(s)", jobs.len());
        let task = tokio::spawn(async move {
            let _guard = guard;
            // The channel closes when `migrator` drops at the end of this block.
            migrator.run(&jobs).await
        });

        Ok(MigrationHandle { events, task })
    }
}

/// Clears the busy flag when dropped, including during a panic unwind.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sends every callback to the run's channel and to the caller's own callback.
struct Fanout {
    channel: ChannelProgressCallback,
    inner: Option<ProgressCallback>,
}

impl MigrationProgressCallback for Fanout {
    fn on_progress(&self, percent: u8) {
        self.channel.on_progress(percent);
        if let Some(cb) = &self.inner {
            cb.on_progress(percent);
        }
    }

    fn on_status(&self, message: &str) {
        self.channel.on_status(message);
        if let Some(cb) = &self.inner {
            cb.on_status(message);
        }
    }

    fn on_job_done(&self, source: &Path) {
        self.channel.on_job_done(source);
        if let Some(cb) = &self.inner {
            cb.on_job_done(source);
        }
    }

    fn on_job_failed(&self, source: &Path, error: &str) {
        self.channel.on_job_failed(source, error);
        if let Some(cb) = &self.inner {
            cb.on_job_failed(source, error);
        }
    }

    fn on_run_complete(&self, total_jobs: usize, written_jobs: usize) {
        self.channel.on_run_complete(total_jobs, written_jobs);
        if let Some(cb) = &self.inner {
            cb.on_run_complete(total_jobs, written_jobs);
        }
    }
}

/// A running (or finished) migration.
#[derive(Debug)]
pub struct MigrationHandle {
    events: mpsc::UnboundedReceiver<MigrationEvent>,
    task: JoinHandle<Result<MigrationSummary, MigrateError>>,
}

impl MigrationHandle {
    /// Next event, or `None` once the run has finished and all events were read.
    pub async fn next_event(&mut self) -> Option<MigrationEvent> {
        self.events.recv().await
    }

    /// Split into an event stream and a completion future.
    pub fn into_parts(self) -> (EventStream, MigrationCompletion) {
        (
            Box::pin(UnboundedReceiverStream::new(self.events)),
            MigrationCompletion { task: self.task },
        )
    }

    /// Wait for the run to end, discarding unread events.
    pub async fn join(self) -> Result<MigrationSummary, MigrateError> {
        MigrationCompletion { task: self.task }.wait().await
    }
}

/// The result half of a [`MigrationHandle`].
#[derive(Debug)]
pub struct MigrationCompletion {
    task: JoinHandle<Result<MigrationSummary, MigrateError>>,
}

impl MigrationCompletion {
    pub async fn wait(self) -> Result<MigrationSummary, MigrateError> {
        self.task
            .await
            .map_err(|e| MigrateError::Internal(format!("migration task failed: {e}")))?
    }
}
