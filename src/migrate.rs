//! The migration pipeline: jobs in, updated documents out.
//!
//! [`Migrator::run`] works through its jobs strictly one after another, and
//! within a job through its images one after another. Nothing overlaps: the
//! settle delay after every upload is the rate limit, so parallelism would
//! only fight it.
//!
//! Failure scopes:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | store init | run aborted, no job processed, `Err` returned |
//! | read / parse / write of a job | that job skipped, run continues |
//! | fetch / decode / encode / upload of one image | that URL left as-is, job continues |

use crate::config::MigrationConfig;
use crate::error::{ImageError, MigrateError};
use crate::pipeline::fetch::{file_name_from_url, Fetcher};
use crate::pipeline::input::{write_document, JobWorkspace, MigrationJob};
use crate::pipeline::throttle::{FixedDelay, UploadThrottle};
use crate::pipeline::{encode, extract, rewrite};
use crate::progress::{percent, MigrationProgressCallback, NoopProgressCallback};
use crate::store::BlobStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

static NOOP: NoopProgressCallback = NoopProgressCallback;

/// Outcome of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub source: PathBuf,
    /// Path of the updated document; `None` when the job failed.
    pub output: Option<PathBuf>,
    pub urls_found: usize,
    pub migrated: usize,
    pub skipped: Vec<SkippedImage>,
    /// Why the job failed, if it did.
    pub error: Option<String>,
}

impl JobReport {
    fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            urls_found: 0,
            migrated: 0,
            skipped: Vec::new(),
            error: None,
        }
    }

    pub fn is_written(&self) -> bool {
        self.output.is_some()
    }
}

/// An image reference that was left untouched, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedImage {
    pub url: String,
    pub error: ImageError,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    pub jobs: Vec<JobReport>,
    pub elapsed_ms: u64,
}

impl MigrationSummary {
    pub fn written_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_written()).count()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs.len() - self.written_jobs()
    }

    pub fn migrated_images(&self) -> usize {
        self.jobs.iter().map(|j| j.migrated).sum()
    }

    pub fn skipped_images(&self) -> usize {
        self.jobs.iter().map(|j| j.skipped.len()).sum()
    }
}

/// Runs migration jobs against an injected fetcher and blob store.
pub struct Migrator {
    config: MigrationConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn BlobStore>,
    throttle: Arc<dyn UploadThrottle>,
}

impl Migrator {
    /// The settle delay defaults to [`FixedDelay`] of `config.upload_delay_ms`.
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
        }
    }

    /// Replace the inter-upload rate limiter.
    pub fn with_throttle(mut self, throttle: Arc<dyn UploadThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    fn callback(&self) -> &dyn MigrationProgressCallback {
        match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &NOOP,
        }
    }

    /// Initialise the store once, then migrate every job in order.
    ///
    /// # Errors
    /// Only [`MigrateError::StoreInit`]; job and image failures are recorded
    /// in the returned [`MigrationSummary`].
    pub async fn run(&self, jobs: &[MigrationJob]) -> Result<MigrationSummary, MigrateError> {
        let start = Instant::now();
        let cb = self.callback();
        info!("Starting migration of {} file(s)", jobs.len());

        // ── Store initialisation ─────────────────────────────────────────
        if let Err(e) = self.store.init().await {
            let e = match e {
                e @ MigrateError::StoreInit { .. } => e,
                other => MigrateError::StoreInit {
                    detail: other.to_string(),
                },
            };
            warn!("Aborting run: {}", e);
            cb.on_status(&format!("An error occurred: {e}"));
            return Err(e);
        }

        // ── Jobs, one at a time ──────────────────────────────────────────
        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            reports.push(self.migrate_job(job).await);
        }

        let summary = MigrationSummary {
            jobs: reports,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Migration complete: {}/{} files written, {} images migrated, {} skipped, {}ms",
            summary.written_jobs(),
            jobs.len(),
            summary.migrated_images(),
            summary.skipped_images(),
            summary.elapsed_ms
        );
        cb.on_status("All files processed.");
        cb.on_run_complete(jobs.len(), summary.written_jobs());
        Ok(summary)
    }

    /// Migrate a single job. Assumes the store has been initialised.
    pub async fn migrate_job(&self, job: &MigrationJob) -> JobReport {
        let cb = self.callback();
        let basename = job.basename();
        cb.on_status(&format!("Processing file: {basename}"));
        info!("Processing {}", job.source().display());

        let mut report = JobReport::new(job.source());
        match self.process_job(job, &mut report).await {
            Ok(output) => {
                cb.on_job_done(job.source());
                cb.on_status(&format!("Finished processing: {}", job.source().display()));
                report.output = Some(output);
            }
            Err(e) => {
                warn!("Job {} failed: {}", job.source().display(), e);
                let message = e.to_string();
                cb.on_status(&format!("Failed to process {basename}: {message}"));
                cb.on_job_failed(job.source(), &message);
                report.error = Some(message);
            }
        }
        report
    }

    async fn process_job(
        &self,
        job: &MigrationJob,
        report: &mut JobReport,
    ) -> Result<PathBuf, MigrateError> {
        let cb = self.callback();

        // ── Extract ──────────────────────────────────────────────────────
        let document = job.load().await?;
        let refs = extract::extract_image_refs(&document);
        report.urls_found = refs.len();
        debug!("{} image reference(s) in {}", refs.len(), job.basename());

        // ── Per-image migration ──────────────────────────────────────────
        // The workspace lives until the end of this function, on every path.
        let workspace = JobWorkspace::create()?;
        let total = refs.len();
        let mut mapping = HashMap::new();

        for (i, image) in refs.iter().enumerate() {
            cb.on_status(&format!("Processing image {} of {}", i + 1, total));
            match self.migrate_image(&image.url, &workspace).await {
                Ok(new_url) => {
                    debug!("{} → {}", image.src, new_url);
                    // Keyed on the literal `src` so the rewrite finds it.
                    mapping.insert(image.src.clone(), new_url);
                    report.migrated += 1;
                    self.throttle.after_upload().await;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", image.src, e);
                    cb.on_status(&format!(
                        "Skipped image {} of {} ({}): {}",
                        i + 1,
                        total,
                        image.src,
                        e
                    ));
                    report.skipped.push(SkippedImage {
                        url: image.src.clone(),
                        error: e,
                    });
                }
            }
            cb.on_progress(percent(i + 1, total));
        }

        // ── Rewrite + write ──────────────────────────────────────────────
        let updated = rewrite::rewrite_document(&document, &mapping);
        let output = job.output_path(&self.config.output_prefix);
        write_document(&updated, &output)?;
        info!(
            "Wrote {} ({}/{} images migrated)",
            output.display(),
            report.migrated,
            total
        );
        Ok(output)
    }

    /// Fetch, maybe transform, and upload one image. Returns the public URL.
    async fn migrate_image(
        &self,
        url: &str,
        workspace: &JobWorkspace,
    ) -> Result<String, ImageError> {
        let bytes = self.fetcher.fetch(url).await?;

        let name = file_name_from_url(url);
        let staged = workspace.file(&name);
        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|e| ImageError::StagingFailed {
                path: staged.clone(),
                detail: e.to_string(),
            })?;

        let (upload_path, upload_bytes) = if self.config.policy.requires_transform(url) {
            let requested = workspace.file(&format!("p_{name}"));
            let written = self.transform_file(staged, requested).await?;
            let transformed =
                tokio::fs::read(&written)
                    .await
                    .map_err(|e| ImageError::StagingFailed {
                        path: written.clone(),
                        detail: e.to_string(),
                    })?;
            (written, transformed)
        } else {
            debug!("{} is exempt; uploading original bytes", url);
            (staged, bytes)
        };

        let file_name = upload_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name);
        let remote_path = format!("{}/{}", self.config.remote_prefix, file_name);
        let content_type = encode::content_type_for(&upload_path);

        self.store
            .upload(upload_bytes, &remote_path, content_type)
            .await
    }

    /// Run the CPU-bound transform off the async executor.
    async fn transform_file(
        &self,
        staged: PathBuf,
        requested: PathBuf,
    ) -> Result<PathBuf, ImageError> {
        let params = self.config.transform;
        let target = requested.clone();
        tokio::task::spawn_blocking(move || encode::process_image(&staged, &requested, &params))
            .await
            .map_err(|e| ImageError::EncodeFailed {
                path: target,
                detail: format!("transform task failed: {e}"),
            })?
    }
}
