//! Command-line surface (§6): a thin `clap`-derived adapter over
//! [`crate::engine::Engine`]. Owns argument parsing, exit-code mapping, and
//! logging initialization; everything else is delegated to the engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{EngineConfigBuilder, ErrorBudget};
use crate::renderer::RenderMode;

/// Atlas crawler: a headless-browser crawl engine that produces
/// self-describing, compressed archive files.
#[derive(Debug, Parser)]
#[command(name = "atlas-crawl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a crawl to completion (or until canceled/capped).
    Crawl(CrawlArgs),
}

/// Render mode, mirrored here (rather than deriving `ValueEnum` on
/// [`RenderMode`] itself) so the engine's render module stays independent
/// of the CLI's argument-parsing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RenderModeArg {
    Raw,
    Prerender,
    Full,
}

impl From<RenderModeArg> for RenderMode {
    fn from(value: RenderModeArg) -> Self {
        match value {
            RenderModeArg::Raw => RenderMode::Raw,
            RenderModeArg::Prerender => RenderMode::Prerender,
            RenderModeArg::Full => RenderMode::Full,
        }
    }
}

#[derive(Debug, Parser)]
pub struct CrawlArgs {
    /// One or more absolute seed URLs.
    #[arg(required_unless_present = "resume")]
    pub seeds: Vec<String>,

    /// Output archive path. Defaults to `./export/<domain>_<timestamp>_<mode>.atls`.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Render mode.
    #[arg(long, value_enum, default_value = "prerender")]
    pub mode: RenderModeArg,

    /// Hard page cap. 0 = unlimited.
    #[arg(long, default_value_t = 0)]
    pub max_pages: u64,

    /// -1 = unlimited, 0 = seeds only, N = seeds + N levels of links.
    #[arg(long, default_value_t = 1)]
    pub max_depth: i64,

    /// Global requests/sec across all hosts.
    #[arg(long, default_value_t = 8.0)]
    pub rps: f64,

    /// Requests/sec for any single host.
    #[arg(long, default_value_t = 2.0)]
    pub per_host_rps: f64,

    /// Number of pages processed concurrently.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Honor robots.txt. Disabling is recorded as a manifest note.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub respect_robots: bool,

    /// -1 = unlimited, 0 = abort on first error, N = abort after N errors.
    #[arg(long, default_value_t = -1)]
    pub max_errors: i64,

    /// Allow-list patterns (glob by default; wrap in `/.../` for regex).
    #[arg(long)]
    pub allow_urls: Vec<String>,

    /// Deny-list patterns (glob by default; wrap in `/.../` for regex).
    #[arg(long)]
    pub deny_urls: Vec<String>,

    /// Resume from a staging directory left by an interrupted crawl.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Pages between durable checkpoints.
    #[arg(long, default_value_t = 500)]
    pub checkpoint_interval: u64,

    /// Path to write the NDJSON event log. Omit to disable.
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// Override the default User-Agent string.
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl CrawlArgs {
    /// Build an [`crate::config::EngineConfig`] from parsed arguments.
    pub fn into_engine_config(self) -> anyhow::Result<crate::config::EngineConfig> {
        let mut builder = EngineConfigBuilder::new(self.seeds)
            .mode(self.mode.into())
            .max_pages(self.max_pages)
            .max_depth(self.max_depth)
            .rps(self.rps)
            .per_host_rps(self.per_host_rps)
            .concurrency(self.concurrency)
            .respect_robots(self.respect_robots)
            .max_errors(self.max_errors)
            .allow_urls(self.allow_urls)
            .deny_urls(self.deny_urls)
            .checkpoint_interval(self.checkpoint_interval);

        if let Some(out) = self.out {
            builder = builder.out(out);
        }
        if let Some(resume) = self.resume {
            builder = builder.resume(resume);
        }
        if let Some(path) = self.event_log {
            builder = builder.event_log_path(path);
        }
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder.build()
    }
}

/// Exit codes per §6.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    ErrorBudgetExceeded = 2,
    RenderFatal = 3,
    WriteFatal = 4,
    ValidationFailed = 5,
    Unknown = 10,
}

/// Map a finished run's completion reason to the §6 exit-code table. The
/// engine's own `exit_code` already encodes the error-budget case; this
/// helper exists for the fatal-error paths the engine surfaces as `Err`.
#[must_use]
pub fn exit_code_for_error(err: &crate::error::CrawlError) -> ExitCode {
    use crate::error::CrawlErrorKind;
    match err.kind() {
        CrawlErrorKind::ValidationFailed => ExitCode::ValidationFailed,
        CrawlErrorKind::WriteIo => ExitCode::WriteFatal,
        CrawlErrorKind::BrowserFatal => ExitCode::RenderFatal,
        _ => ExitCode::Unknown,
    }
}

impl ErrorBudget {
    /// Present only so CLI help text and tests can describe the budget in
    /// human terms without reaching into engine internals.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            ErrorBudget::Unlimited => "unlimited",
            ErrorBudget::AbortOnFirst => "abort on first error",
            ErrorBudget::AbortAfter(_) => "abort after N errors",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_args_parse_minimal_seed() {
        let cli = Cli::parse_from(["atlas-crawl", "crawl", "https://example.com"]);
        let Command::Crawl(args) = cli.command;
        assert_eq!(args.seeds, vec!["https://example.com".to_string()]);
        assert_eq!(args.mode, RenderModeArg::Prerender);
        assert_eq!(args.max_depth, 1);
        assert_eq!(args.max_pages, 0);
    }

    #[test]
    fn crawl_args_build_engine_config() {
        let cli = Cli::parse_from([
            "atlas-crawl",
            "crawl",
            "https://example.com",
            "--mode",
            "full",
            "--max-depth",
            "2",
            "--max-pages",
            "100",
        ]);
        let Command::Crawl(args) = cli.command;
        let config = args.into_engine_config().unwrap();
        assert_eq!(config.mode, RenderMode::Full);
        assert_eq!(config.max_pages, 100);
    }

    #[test]
    fn resume_without_seeds_is_allowed() {
        let cli = Cli::parse_from(["atlas-crawl", "crawl", "--resume", "/tmp/staging"]);
        let Command::Crawl(args) = cli.command;
        assert!(args.seeds.is_empty());
        assert_eq!(args.resume, Some(PathBuf::from("/tmp/staging")));
    }
}
