//! Error types for the json-image-migrator library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MigrateError`] — **Fatal**: a job (one JSON file) or the whole run
//!   cannot proceed. Job-scoped variants (unreadable input, invalid JSON,
//!   output not writable) abort that job only; run-scoped variants
//!   (store initialisation, a run already active) abort everything.
//!
//! * [`ImageError`] — **Non-fatal**: a single image reference could not be
//!   migrated (download failed, bytes are not an image, upload rejected). The
//!   reference is left untouched in the output document and the job carries
//!   on. Stored in [`crate::migrate::JobReport::skipped`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the json-image-migrator library.
#[derive(Debug, Error)]
pub enum MigrateError {
    // ── Job errors ────────────────────────────────────────────────────────
    /// Input JSON file was not found at the given path.
    #[error("JSON file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Reading the input file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file is not valid JSON.
    #[error("'{path}' is not valid JSON: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Could not write the updated JSON document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The per-job scratch directory could not be created.
    #[error("Failed to create temporary workspace: {0}")]
    WorkspaceFailed(String),

    // ── Run errors ────────────────────────────────────────────────────────
    /// The blob store rejected its credentials or could not be reached.
    #[error("Storage initialisation failed: {detail}")]
    StoreInit { detail: String },

    /// [`crate::worker::MigrationWorker::start`] was called while a run is active.
    #[error("A migration is already running")]
    AlreadyRunning,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    /// `true` when the error ends the whole run rather than a single job.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::StoreInit { .. }
                | MigrateError::AlreadyRunning
                | MigrateError::InvalidConfig(_)
                | MigrateError::Internal(_)
        )
    }
}

/// A non-fatal error for a single image reference.
///
/// The reference stays in the document unchanged; the job continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// Network error or non-success response.
    #[error("download of '{url}' failed: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The downloaded bytes could not be decoded as an image.
    #[error("image is unreadable: {detail}")]
    Unreadable { detail: String },

    /// The transformed image could not be encoded or written.
    #[error("could not save transformed image '{path}': {detail}")]
    EncodeFailed { path: PathBuf, detail: String },

    /// Staging the downloaded bytes in the job workspace failed.
    #[error("could not stage '{path}': {detail}")]
    StagingFailed { path: PathBuf, detail: String },

    /// The blob store rejected or failed the upload.
    #[error("upload to '{remote_path}' failed: {detail}")]
    UploadFailed { remote_path: String, detail: String },
}
