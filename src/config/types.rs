//! `EngineConfig`: the single explicit configuration record the core takes.
//!
//! Every CLI-visible option from the crawl command's surface lives here,
//! enumerated directly rather than behind an options "bag" (`HashMap<String,
//! Value>`-style config is the pattern this type replaces). Defaults match
//! the values documented alongside each option.

use std::path::PathBuf;
use std::time::Duration;

use crate::normalizer::{default_tracking_blocklist, NormalizerConfig, ParamPolicy, PatternSet};
use crate::renderer::RenderMode;

/// `max_depth` semantics: unlimited, seeds only, or a bounded hop count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthPolicy {
    Unlimited,
    SeedsOnly,
    Bounded(u32),
}

impl DepthPolicy {
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match value {
            v if v < 0 => Self::Unlimited,
            0 => Self::SeedsOnly,
            v => Self::Bounded(v as u32),
        }
    }

    /// Whether `depth` is still within policy (used both to gate dispatch
    /// and to decide whether a discovered edge is enqueue-eligible).
    #[must_use]
    pub fn allows(self, depth: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::SeedsOnly => depth == 0,
            Self::Bounded(max) => depth <= max,
        }
    }
}

/// `max_errors` semantics: unlimited, abort-on-first, or abort-after-N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBudget {
    Unlimited,
    AbortOnFirst,
    AbortAfter(u64),
}

impl ErrorBudget {
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match value {
            v if v < 0 => Self::Unlimited,
            0 => Self::AbortOnFirst,
            v => Self::AbortAfter(v as u64),
        }
    }

    /// Whether `errors_count` has exceeded the budget (§4.7 step 3).
    #[must_use]
    pub fn exceeded(self, errors_count: u64) -> bool {
        match self {
            Self::Unlimited => false,
            Self::AbortOnFirst => errors_count > 0,
            Self::AbortAfter(n) => errors_count > n,
        }
    }
}

/// Default identifying User-Agent: a crawler name plus a contact URL, per
/// §6's "identifies as crawler with a contact URL" requirement.
pub const DEFAULT_USER_AGENT: &str =
    concat!("AtlasCrawler/", env!("CARGO_PKG_VERSION"), " (+https://example.invalid/bot)");

/// The crawl engine's complete, explicit configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub seeds: Vec<String>,
    pub out: Option<PathBuf>,
    pub mode: RenderMode,
    pub max_pages: u64,
    pub max_depth: DepthPolicy,
    pub global_rps: f64,
    pub per_host_rps: f64,
    pub concurrency: usize,
    pub respect_robots: bool,
    pub max_errors: ErrorBudget,
    pub allow_urls: Vec<String>,
    pub deny_urls: Vec<String>,
    pub resume: Option<PathBuf>,
    pub checkpoint_interval: u64,

    // Ambient knobs not in the CLI option table but required to run.
    pub event_log_path: Option<PathBuf>,
    pub user_agent: String,
    pub shutdown_grace_ms: u64,
    pub render_timeout: Duration,
    pub rss_high_water_mb: u64,
    pub rss_low_water_mb: u64,
    pub part_roll_bytes: u64,
    pub flush_every_records: u64,
    pub browser_recycle_pages: u32,
    pub media_capture: bool,
    pub param_policy: ParamPolicy,
}

impl EngineConfig {
    /// Host of the first seed, used as the normalizer's internal/external
    /// classification boundary. Panics only if no seed parses, which the
    /// builder's `build()` already validates against.
    #[must_use]
    pub fn origin_host(&self) -> String {
        self.seeds
            .first()
            .and_then(|s| url::Url::parse(s).ok())
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Build a [`NormalizerConfig`] from this config's param/pattern options.
    pub fn normalizer_config(&self) -> anyhow::Result<NormalizerConfig> {
        Ok(NormalizerConfig {
            param_policy: self.param_policy,
            tracking_blocklist: default_tracking_blocklist(),
            allow_patterns: PatternSet::compile(&self.allow_urls)?,
            deny_patterns: PatternSet::compile(&self.deny_urls)?,
            origin_host: self.origin_host(),
        })
    }

    /// Auto-generated output path: `<domain>_<YYYYMMDD_HHMMSS>_<mode>.atls`
    /// under `./export/`, used when `out` is not set.
    #[must_use]
    pub fn resolved_out_path(&self, now: chrono::DateTime<chrono::Utc>) -> PathBuf {
        if let Some(out) = &self.out {
            return out.clone();
        }
        let domain = self.origin_host();
        let mode = match self.mode {
            RenderMode::Raw => "raw",
            RenderMode::Prerender => "prerender",
            RenderMode::Full => "full",
        };
        let stamp = now.format("%Y%m%d_%H%M%S");
        PathBuf::from("export").join(format!("{domain}_{stamp}_{mode}.atls"))
    }
}

/// Builder for [`EngineConfig`]. Only `seeds` is mandatory; every other
/// field has a documented default, so a single ordinary builder (rather
/// than a per-field typestate) is sufficient here.
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new(seeds: Vec<String>) -> Self {
        Self {
            config: EngineConfig {
                seeds,
                out: None,
                mode: RenderMode::Prerender,
                max_pages: 0,
                max_depth: DepthPolicy::Bounded(1),
                global_rps: 8.0,
                per_host_rps: crate::utils::constants::DEFAULT_CRAWL_RATE_RPS,
                concurrency: 8,
                respect_robots: true,
                max_errors: ErrorBudget::Unlimited,
                allow_urls: Vec::new(),
                deny_urls: Vec::new(),
                resume: None,
                checkpoint_interval: 500,
                event_log_path: None,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                shutdown_grace_ms: 30_000,
                render_timeout: Duration::from_secs(30),
                rss_high_water_mb: 2048,
                rss_low_water_mb: 1536,
                part_roll_bytes: 150 * 1024 * 1024,
                flush_every_records: 1000,
                browser_recycle_pages: 50,
                media_capture: true,
                param_policy: ParamPolicy::Sample,
            },
        }
    }

    #[must_use]
    pub fn out(mut self, out: impl Into<PathBuf>) -> Self {
        self.config.out = Some(out.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.config.mode = mode;
        self.config.media_capture = mode == RenderMode::Full;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, max_pages: u64) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: i64) -> Self {
        self.config.max_depth = DepthPolicy::from_i64(max_depth);
        self
    }

    #[must_use]
    pub fn rps(mut self, rps: f64) -> Self {
        self.config.global_rps = rps;
        self
    }

    #[must_use]
    pub fn per_host_rps(mut self, per_host_rps: f64) -> Self {
        self.config.per_host_rps = per_host_rps;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn respect_robots(mut self, respect_robots: bool) -> Self {
        self.config.respect_robots = respect_robots;
        self
    }

    #[must_use]
    pub fn max_errors(mut self, max_errors: i64) -> Self {
        self.config.max_errors = ErrorBudget::from_i64(max_errors);
        self
    }

    #[must_use]
    pub fn allow_urls(mut self, patterns: Vec<String>) -> Self {
        self.config.allow_urls = patterns;
        self
    }

    #[must_use]
    pub fn deny_urls(mut self, patterns: Vec<String>) -> Self {
        self.config.deny_urls = patterns;
        self
    }

    #[must_use]
    pub fn resume(mut self, staging_dir: impl Into<PathBuf>) -> Self {
        self.config.resume = Some(staging_dir.into());
        self
    }

    #[must_use]
    pub fn checkpoint_interval(mut self, pages: u64) -> Self {
        self.config.checkpoint_interval = pages.max(1);
        self
    }

    #[must_use]
    pub fn event_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.event_log_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn param_policy(mut self, policy: ParamPolicy) -> Self {
        self.config.param_policy = policy;
        self
    }

    /// Validate and finish the config. Fails only on structurally invalid
    /// input (no seeds and no resume directory, or a seed that fails to
    /// parse as an absolute URL). A `--resume` run carries its seeds inside
    /// the checkpoint rather than on the command line, so it is exempt from
    /// the "at least one seed" rule.
    pub fn build(self) -> anyhow::Result<EngineConfig> {
        if self.config.seeds.is_empty() && self.config.resume.is_none() {
            anyhow::bail!("at least one seed URL is required (or --resume a staging directory)");
        }
        for seed in &self.config.seeds {
            url::Url::parse(seed).map_err(|e| anyhow::anyhow!("invalid seed URL {seed:?}: {e}"))?;
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_policy_bounds_correctly() {
        assert!(DepthPolicy::from_i64(-1).allows(1000));
        assert!(!DepthPolicy::from_i64(0).allows(1));
        assert!(DepthPolicy::from_i64(0).allows(0));
        assert!(DepthPolicy::from_i64(2).allows(2));
        assert!(!DepthPolicy::from_i64(2).allows(3));
    }

    #[test]
    fn error_budget_semantics_match_spec() {
        assert!(!ErrorBudget::from_i64(-1).exceeded(1_000_000));
        assert!(ErrorBudget::from_i64(0).exceeded(1));
        assert!(!ErrorBudget::from_i64(0).exceeded(0));
        assert!(!ErrorBudget::from_i64(5).exceeded(5));
        assert!(ErrorBudget::from_i64(5).exceeded(6));
    }

    #[test]
    fn build_requires_at_least_one_valid_seed() {
        assert!(EngineConfigBuilder::new(vec![]).build().is_err());
        assert!(EngineConfigBuilder::new(vec!["not a url".into()]).build().is_err());
        assert!(EngineConfigBuilder::new(vec!["https://example.com".into()]).build().is_ok());
    }

    #[test]
    fn auto_generated_out_path_embeds_domain_and_mode() {
        let config = EngineConfigBuilder::new(vec!["https://example.com/a".into()])
            .mode(RenderMode::Full)
            .build()
            .unwrap();
        let now = chrono::DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let path = config.resolved_out_path(now);
        assert_eq!(path, PathBuf::from("export/example.com_20260102_030405_full.atls"));
    }
}
