//! Configuration types for image migration.
//!
//! All migration behaviour is controlled through [`MigrationConfig`], built
//! via its [`MigrationConfigBuilder`]. The defaults reproduce the values the
//! tool has always shipped with: erase `#EBF3F3` backgrounds within ±30 per
//! channel, boost contrast 1.5×, darken greys with gamma 0.2, leave
//! `cdn.testbook.com` images untouched, and wait 2 s after every upload.

use crate::error::MigrateError;
use crate::progress::ProgressCallback;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Watermark background colour removed by default.
pub const DEFAULT_TARGET_COLOR: TargetColor = TargetColor {
    r: 0xEB,
    g: 0xF3,
    b: 0xF3,
};

/// Hosts whose images are uploaded without transformation by default.
pub const DEFAULT_EXEMPT_DOMAINS: &[&str] = &["cdn.testbook.com"];

/// Configuration for a migration run.
///
/// Built via [`MigrationConfig::builder()`] or using
/// [`MigrationConfig::default()`].
///
/// # Example
/// ```rust
/// use json_image_migrator::MigrationConfig;
///
/// let config = MigrationConfig::builder()
///     .upload_delay_ms(500)
///     .exempt_domain("images.example.com")
///     .build()
///     .unwrap();
/// assert_eq!(config.upload_delay_ms, 500);
/// ```
#[derive(Clone)]
pub struct MigrationConfig {
    /// Pixel-transform parameters for non-exempt images.
    pub transform: TransformParams,

    /// Which hosts skip the transform.
    pub policy: TransformPolicy,

    /// Settle delay after every successful upload, in milliseconds. Default: 2000.
    ///
    /// A self-imposed rate limit against the object-store API.
    pub upload_delay_ms: u64,

    /// Remote folder uploads land in. Default: `migrated_images`.
    pub remote_prefix: String,

    /// Prefix prepended to the input file name for the output file. Default: `updated_`.
    pub output_prefix: String,

    /// Per-image download timeout in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Receives progress, status and job-completion events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            transform: TransformParams::default(),
            policy: TransformPolicy::default(),
            upload_delay_ms: 2000,
            remote_prefix: "migrated_images".to_string(),
            output_prefix: "updated_".to_string(),
            fetch_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("transform", &self.transform)
            .field("policy", &self.policy)
            .field("upload_delay_ms", &self.upload_delay_ms)
            .field("remote_prefix", &self.remote_prefix)
            .field("output_prefix", &self.output_prefix)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn MigrationProgressCallback>"),
            )
            .finish()
    }
}

impl MigrationConfig {
    /// Create a new builder for `MigrationConfig`.
    pub fn builder() -> MigrationConfigBuilder {
        MigrationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`MigrationConfig`].
#[derive(Debug)]
pub struct MigrationConfigBuilder {
    config: MigrationConfig,
}

impl MigrationConfigBuilder {
    pub fn target_color(mut self, color: TargetColor) -> Self {
        self.config.transform.target = color;
        self
    }

    pub fn tolerance(mut self, tolerance: u8) -> Self {
        self.config.transform.tolerance = tolerance;
        self
    }

    pub fn contrast_alpha(mut self, alpha: f32) -> Self {
        self.config.transform.contrast_alpha = alpha;
        self
    }

    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.transform.gamma = gamma;
        self
    }

    /// Add one exempt domain to the defaults.
    pub fn exempt_domain(mut self, domain: impl Into<String>) -> Self {
        let extra = TransformPolicy::new([domain]);
        self.config.policy.exempt_domains.extend(extra.exempt_domains);
        self
    }

    /// Replace the exempt-domain list entirely.
    pub fn exempt_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.policy = TransformPolicy::new(domains);
        self
    }

    pub fn upload_delay_ms(mut self, ms: u64) -> Self {
        self.config.upload_delay_ms = ms;
        self
    }

    pub fn remote_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.remote_prefix = prefix.into();
        self
    }

    pub fn output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.output_prefix = prefix.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MigrationConfig, MigrateError> {
        let c = &self.config;
        if !(c.transform.gamma.is_finite() && c.transform.gamma > 0.0) {
            return Err(MigrateError::InvalidConfig(format!(
                "gamma must be > 0, got {}",
                c.transform.gamma
            )));
        }
        if !(c.transform.contrast_alpha.is_finite() && c.transform.contrast_alpha >= 0.0) {
            return Err(MigrateError::InvalidConfig(format!(
                "contrast gain must be ≥ 0, got {}",
                c.transform.contrast_alpha
            )));
        }
        let prefix = c.remote_prefix.trim();
        if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(MigrateError::InvalidConfig(format!(
                "remote prefix must be a non-empty path without leading/trailing '/', got '{}'",
                c.remote_prefix
            )));
        }
        if c.output_prefix.is_empty() {
            return Err(MigrateError::InvalidConfig(
                "output prefix must not be empty (the input file would be overwritten)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Transform parameters ─────────────────────────────────────────────────

/// An RGB colour parsed from `#RRGGBB` / `RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl TargetColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Inclusive per-channel window `[c - tolerance, c + tolerance]`, clamped to 0–255.
    /// Returned as `(lower, upper)` RGB triples.
    pub fn window(&self, tolerance: u8) -> ([u8; 3], [u8; 3]) {
        let lo = |c: u8| c.saturating_sub(tolerance);
        let hi = |c: u8| c.saturating_add(tolerance);
        (
            [lo(self.r), lo(self.g), lo(self.b)],
            [hi(self.r), hi(self.g), hi(self.b)],
        )
    }
}

impl FromStr for TargetColor {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MigrateError::InvalidConfig(format!(
                "colour must be #RRGGBB, got '{s}'"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| MigrateError::InvalidConfig(format!("bad colour '{s}': {e}")))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for TargetColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Parameters of the watermark-removal transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    /// Background colour erased to white. Default: `#EBF3F3`.
    pub target: TargetColor,
    /// Per-channel tolerance around `target`. Default: 30.
    pub tolerance: u8,
    /// Linear contrast gain. Default: 1.5.
    pub contrast_alpha: f32,
    /// Gamma of the darkening curve; intensities map through `(v/255)^(1/gamma)`. Default: 0.2.
    pub gamma: f32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET_COLOR,
            tolerance: 30,
            contrast_alpha: 1.5,
            gamma: 0.2,
        }
    }
}

/// Decides per URL whether the transform runs before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformPolicy {
    pub exempt_domains: Vec<String>,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXEMPT_DOMAINS.iter().copied())
    }
}

impl TransformPolicy {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt_domains: domains
                .into_iter()
                .map(|d| d.into().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// `true` when the URL's host is an exempt domain or one of its subdomains.
    /// URLs without a parseable host are never exempt.
    pub fn is_exempt(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        else {
            return false;
        };
        self.exempt_domains.iter().any(|d| {
            host == *d
                || host
                    .strip_suffix(d.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    pub fn requires_transform(&self, url: &str) -> bool {
        !self.is_exempt(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!("#EBF3F3".parse::<TargetColor>().unwrap(), DEFAULT_TARGET_COLOR);
        assert_eq!("ebf3f3".parse::<TargetColor>().unwrap(), DEFAULT_TARGET_COLOR);
        assert_eq!(DEFAULT_TARGET_COLOR.to_string(), "#EBF3F3");
    }

    #[test]
    fn rejects_malformed_colours() {
        assert!("#EBF3F".parse::<TargetColor>().is_err());
        assert!("#GGGGGG".parse::<TargetColor>().is_err());
        assert!("".parse::<TargetColor>().is_err());
    }

    #[test]
    fn window_clamps_to_byte_range() {
        let (lo, hi) = DEFAULT_TARGET_COLOR.window(30);
        assert_eq!(lo, [205, 213, 213]);
        assert_eq!(hi, [255, 255, 255]);

        let (lo, _) = TargetColor::new(10, 0, 200).window(30);
        assert_eq!(lo, [0, 0, 170]);
    }

    #[test]
    fn default_policy_exempts_testbook_cdn() {
        let p = TransformPolicy::default();
        assert!(p.is_exempt("https://cdn.testbook.com/x.png"));
        assert!(p.is_exempt("https://CDN.TESTBOOK.COM/x.png"));
        assert!(p.is_exempt("https://img.cdn.testbook.com/x.png"));
        assert!(!p.is_exempt("https://ex.com/x.png"));
        assert!(!p.is_exempt("https://notcdn.testbook.com.evil.io/x.png"));
        assert!(!p.is_exempt("https://xcdn.testbook.com/x.png"));
        assert!(!p.is_exempt("relative/path.png"));
        assert!(p.requires_transform("https://ex.com/x.png"));
    }

    #[test]
    fn builder_defaults_match_shipped_values() {
        let c = MigrationConfig::builder().build().unwrap();
        assert_eq!(c.upload_delay_ms, 2000);
        assert_eq!(c.remote_prefix, "migrated_images");
        assert_eq!(c.output_prefix, "updated_");
        assert_eq!(c.transform.tolerance, 30);
        assert_eq!(c.transform.contrast_alpha, 1.5);
        assert_eq!(c.transform.gamma, 0.2);
    }

    #[test]
    fn builder_rejects_non_positive_gamma() {
        let err = MigrationConfig::builder().gamma(0.0).build().unwrap_err();
        assert!(matches!(err, MigrateError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_prefixes() {
        assert!(MigrationConfig::builder().remote_prefix("/abs").build().is_err());
        assert!(MigrationConfig::builder().remote_prefix("").build().is_err());
        assert!(MigrationConfig::builder().output_prefix("").build().is_err());
    }

    #[test]
    fn exempt_domain_adds_to_defaults() {
        let c = MigrationConfig::builder()
            .exempt_domain(" Images.Example.com ")
            .build()
            .unwrap();
        assert!(c.policy.is_exempt("https://cdn.testbook.com/a.png"));
        assert!(c.policy.is_exempt("https://images.example.com/a.png"));
    }

    #[test]
    fn exempt_domains_replaces_list() {
        let c = MigrationConfig::builder()
            .exempt_domains(["Static.Example.org."])
            .build()
            .unwrap();
        assert_eq!(c.policy.exempt_domains, vec!["static.example.org"]);
        assert!(!c.policy.is_exempt("https://cdn.testbook.com/a.png"));
    }
}
