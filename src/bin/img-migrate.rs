//! CLI binary for json-image-migrator.
//!
//! A thin shim over the library crate: maps flags to `MigrationConfig`,
//! resolves storage credentials, starts one run on the background worker and
//! renders its events.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use gcs_store::Credentials;
use indicatif::{ProgressBar, ProgressStyle};
use json_image_migrator::{
    GcsBlobStore, HttpFetcher, MigrationConfig, MigrationEvent, MigrationJob, MigrationSummary,
    MigrationWorker, TargetColor,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Event rendering ──────────────────────────────────────────────────────────

/// Renders pipeline events either on a live progress bar or as plain
/// status lines on stderr.
struct Reporter {
    bar: Option<ProgressBar>,
    quiet: bool,
    total_files: usize,
    files_seen: usize,
}

impl Reporter {
    fn new(total_files: usize, show_bar: bool, quiet: bool) -> Self {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::new(100);
            let style = ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.set_prefix("Connecting");
            bar.set_message("authenticating with storage…");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            bar,
            quiet,
            total_files,
            files_seen: 0,
        }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None if !self.quiet => eprintln!("{line}"),
            None => {}
        }
    }

    fn handle(&mut self, event: MigrationEvent) {
        match event {
            MigrationEvent::Progress { percent } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(u64::from(percent));
                }
            }
            MigrationEvent::Status { message } => self.status(message),
            MigrationEvent::JobDone { source } => {
                self.println(format!("  {} {}", green("✓"), source.display()));
            }
            MigrationEvent::JobFailed { source, error } => {
                self.println(format!(
                    "  {} {}  {}",
                    red("✗"),
                    source.display(),
                    red(&truncate(&error, 100))
                ));
            }
            MigrationEvent::RunComplete { .. } => {
                if let Some(bar) = &self.bar {
                    bar.finish_and_clear();
                }
            }
        }
    }

    fn status(&mut self, message: String) {
        if let Some(name) = message.strip_prefix("Processing file: ") {
            self.files_seen += 1;
            let prefix = format!("[{}/{}] {}", self.files_seen, self.total_files, name);
            match &self.bar {
                Some(bar) => {
                    bar.set_prefix(prefix);
                    bar.set_position(0);
                    bar.set_message("");
                    bar.reset_eta();
                }
                None => self.println(format!("{} {}", cyan("◆"), bold(&prefix))),
            }
        } else if message.starts_with("Skipped image") {
            self.println(format!("    {} {}", yellow("⚠"), truncate(&message, 160)));
        } else if message.starts_with("An error occurred") {
            self.println(format!("{} {}", red("✘"), message));
        } else if message.starts_with("Processing image") {
            match &self.bar {
                Some(bar) => bar.set_message(message),
                None => self.println(format!("    {}", dim(&message))),
            }
        } else if self.bar.is_none() {
            // Finished / Failed / All-done lines; the bar shows these as ✓/✗.
            self.println(format!("  {}", dim(&message)));
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Migrate two question banks using a service-account key
  img-migrate --bucket my-app.appspot.com --credentials key.json q1.json q2.json

  # Use a pre-minted token (e.g. from `gcloud auth print-access-token`)
  GCS_ACCESS_TOKEN=$(gcloud auth print-access-token) \
    img-migrate --bucket my-app.appspot.com questions.json

  # Different watermark colour, gentler darkening, no settle delay
  img-migrate --target-color '#F0F0F0' --gamma 0.5 --upload-delay-ms 0 q.json

  # Machine-readable summary
  img-migrate --json questions.json > report.json

  # Against the fake-gcs-server emulator
  STORAGE_EMULATOR_HOST=localhost:4443 GCS_ACCESS_TOKEN=x \
    img-migrate --bucket test questions.json

OUTPUT:
  For every input <dir>/<name>.json, <dir>/updated_<name>.json is written.
  Images are uploaded to migrated_images/<file> and made public. Images that
  cannot be downloaded, decoded or uploaded keep their original URL.

ENVIRONMENT VARIABLES:
  GOOGLE_APPLICATION_CREDENTIALS  Service-account JSON key file
  GCS_ACCESS_TOKEN                OAuth2 access token (wins over the key file)
  GCS_BUCKET                      Bucket name when --bucket is not given
  STORAGE_EMULATOR_HOST           Storage API endpoint override
  RUST_LOG                        Log filter (overrides -v / -q)
"#;

/// Migrate <img> references inside JSON documents to cloud storage.
#[derive(Parser, Debug)]
#[command(
    name = "img-migrate",
    version,
    about = "Migrate <img> references inside JSON documents to cloud storage",
    long_about = "Scan JSON files for embedded <img> tags, download each image, remove the \
scanned watermark background, upload the result to a Google Cloud Storage / Firebase bucket \
and write updated_<name>.json with the new public URLs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON files to migrate, processed in the order given.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Destination bucket (falls back to GCS_BUCKET).
    #[arg(short, long, env = "IMG_MIGRATE_BUCKET")]
    bucket: Option<String>,

    /// Service-account JSON key file.
    #[arg(long, env = "IMG_MIGRATE_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// OAuth2 access token used instead of a key file.
    #[arg(long, env = "IMG_MIGRATE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Storage API endpoint (emulators, proxies).
    #[arg(long, env = "IMG_MIGRATE_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Watermark background colour to erase, as #RRGGBB.
    #[arg(long, env = "IMG_MIGRATE_TARGET_COLOR", default_value = "#EBF3F3")]
    target_color: TargetColor,

    /// Per-channel tolerance around the target colour.
    #[arg(long, env = "IMG_MIGRATE_TOLERANCE", default_value_t = 30)]
    tolerance: u8,

    /// Linear contrast gain.
    #[arg(long, env = "IMG_MIGRATE_CONTRAST", default_value_t = 1.5)]
    contrast: f32,

    /// Gamma of the darkening curve (smaller is darker).
    #[arg(long, env = "IMG_MIGRATE_GAMMA", default_value_t = 0.2)]
    gamma: f32,

    /// Host whose images are uploaded untouched (repeatable; replaces the default list).
    #[arg(
        long = "exempt-domain",
        env = "IMG_MIGRATE_EXEMPT_DOMAINS",
        value_delimiter = ',',
        default_value = "cdn.testbook.com"
    )]
    exempt_domains: Vec<String>,

    /// Pause after every upload, in milliseconds.
    #[arg(long, env = "IMG_MIGRATE_UPLOAD_DELAY_MS", default_value_t = 2000)]
    upload_delay_ms: u64,

    /// Remote folder for uploaded images.
    #[arg(long, env = "IMG_MIGRATE_REMOTE_PREFIX", default_value = "migrated_images")]
    remote_prefix: String,

    /// Per-image download timeout in seconds.
    #[arg(long, env = "IMG_MIGRATE_FETCH_TIMEOUT", default_value_t = 60)]
    fetch_timeout: u64,

    /// Print a JSON run summary to stdout.
    #[arg(long, env = "IMG_MIGRATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMG_MIGRATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG_MIGRATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG_MIGRATE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-image feedback; library INFO logs
    // would only tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build pipeline ───────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let store = build_store(&cli)?;
    let fetcher =
        HttpFetcher::new(config.fetch_timeout_secs).context("Failed to create HTTP client")?;

    let jobs: Vec<MigrationJob> = cli.files.iter().map(MigrationJob::new).collect();
    let worker = MigrationWorker::new(config, Arc::new(fetcher), Arc::new(store));

    // ── Run ──────────────────────────────────────────────────────────────
    let handle = worker.start(jobs).context("Failed to start migration")?;
    let (mut events, completion) = handle.into_parts();

    let mut reporter = Reporter::new(cli.files.len(), show_progress, cli.quiet || cli.json);
    while let Some(event) = events.next().await {
        reporter.handle(event);
    }
    reporter.finish();

    let summary = completion.wait().await.context("Migration aborted")?;

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let json =
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&summary);
    }

    let failed = summary.failed_jobs();
    if failed > 0 {
        anyhow::bail!("{} of {} files could not be migrated", failed, summary.jobs.len());
    }
    Ok(())
}

fn print_summary(summary: &MigrationSummary) {
    let written = summary.written_jobs();
    let total = summary.jobs.len();
    let skipped = summary.skipped_images();
    let mark = if written == total && skipped == 0 {
        green("✔")
    } else if written == 0 {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {}/{} files  {} images migrated  {} skipped  {}ms",
        mark,
        bold(&written.to_string()),
        total,
        bold(&summary.migrated_images().to_string()),
        if skipped == 0 {
            dim("0")
        } else {
            yellow(&skipped.to_string())
        },
        summary.elapsed_ms,
    );
    for job in summary.jobs.iter().filter(|j| j.is_written()) {
        if let Some(ref out) = job.output {
            eprintln!("   → {}", bold(&out.display().to_string()));
        }
    }
}

/// Map CLI args to `MigrationConfig`.
fn build_config(cli: &Cli) -> Result<MigrationConfig> {
    MigrationConfig::builder()
        .target_color(cli.target_color)
        .tolerance(cli.tolerance)
        .contrast_alpha(cli.contrast)
        .gamma(cli.gamma)
        .exempt_domains(cli.exempt_domains.iter().cloned())
        .upload_delay_ms(cli.upload_delay_ms)
        .remote_prefix(cli.remote_prefix.clone())
        .fetch_timeout_secs(cli.fetch_timeout)
        .build()
        .context("Invalid configuration")
}

/// Resolve bucket, credentials and endpoint from flags, then the environment.
fn build_store(cli: &Cli) -> Result<GcsBlobStore> {
    let bucket = cli
        .bucket
        .clone()
        .or_else(|| std::env::var("GCS_BUCKET").ok().filter(|b| !b.is_empty()))
        .context("No bucket given: pass --bucket or set GCS_BUCKET")?;

    let credentials = if let Some(ref token) = cli.access_token {
        Credentials::AccessToken(token.clone())
    } else if let Some(ref path) = cli.credentials {
        Credentials::service_account_file(path)
            .with_context(|| format!("Failed to load credentials from {}", path.display()))?
    } else {
        Credentials::from_env().context("No storage credentials")?
    };

    let endpoint = cli
        .storage_endpoint
        .clone()
        .unwrap_or_else(gcs_store::endpoint_from_env);

    GcsBlobStore::connect(bucket, credentials, Some(&endpoint))
        .context("Failed to configure storage client")
}
