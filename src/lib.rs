//! # json-image-migrator
//!
//! Move the images referenced by JSON question banks into your own object
//! storage, cleaning up scanned watermarks on the way.
//!
//! Each input file is a JSON array whose string elements carry HTML
//! fragments. Every `<img src="…">` found there is downloaded, run through a
//! watermark-removal transform (unless it comes from an exempt host),
//! uploaded to a bucket, and the document is written back out as
//! `updated_<name>` with the new public URLs substituted in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! questions.json
//!  │
//!  ├─ 1. Load      parse the JSON document
//!  ├─ 2. Extract   <img src> URLs from top-level strings, in order
//!  ├─ 3. Fetch     download each image (reqwest)
//!  ├─ 4. Clean     erase #EBF3F3, contrast ×1.5, grayscale, gamma 0.2
//!  │               (spawn_blocking; skipped for exempt hosts)
//!  ├─ 5. Upload    migrated_images/<name>, public-read, 2 s settle delay
//!  ├─ 6. Rewrite   substitute new URLs (longest match first)
//!  └─ 7. Write     updated_questions.json beside the input, atomically
//! ```
//!
//! Images that fail at any step are left pointing at their old URL; the rest
//! of the file still migrates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use json_image_migrator::{
//!     Credentials, GcsBlobStore, HttpFetcher, MigrationConfig, MigrationJob, Migrator,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrationConfig::default();
//!     let fetcher = HttpFetcher::new(config.fetch_timeout_secs)?;
//!     let store = GcsBlobStore::connect("my-bucket", Credentials::from_env()?, None)?;
//!
//!     let migrator = Migrator::new(config, Arc::new(fetcher), Arc::new(store));
//!     let summary = migrator.run(&[MigrationJob::new("questions.json")]).await?;
//!     eprintln!("{} images migrated", summary.migrated_images());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `img-migrate` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! json-image-migrator = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    MigrationConfig, MigrationConfigBuilder, TargetColor, TransformParams, TransformPolicy,
};
pub use error::{ImageError, MigrateError};
pub use gcs_store::Credentials;
pub use migrate::{JobReport, MigrationSummary, Migrator, SkippedImage};
pub use pipeline::encode::process_image;
pub use pipeline::extract::{extract_image_refs, extract_image_urls, ImageRef};
pub use pipeline::fetch::{Fetcher, HttpFetcher};
pub use pipeline::input::MigrationJob;
pub use pipeline::rewrite::rewrite_document;
pub use pipeline::throttle::{FixedDelay, UploadThrottle};
pub use pipeline::transform::transform_image;
pub use progress::{
    ChannelProgressCallback, MigrationEvent, MigrationProgressCallback, NoopProgressCallback,
    ProgressCallback,
};
pub use store::{BlobStore, GcsBlobStore};
pub use worker::{EventStream, MigrationCompletion, MigrationHandle, MigrationWorker};
