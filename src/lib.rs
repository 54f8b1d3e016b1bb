//! Atlas crawler: a polite, depth-banded BFS crawler that normalizes URLs,
//! respects robots.txt, rate-limits per-host and globally, optionally
//! renders pages in a headless browser, runs a battery of pure extractors
//! over the result, and writes everything to a content-addressed archive
//! that can be checkpointed and resumed.

pub mod archive;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod crawl_events;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod fetcher;
pub mod imurl;
pub mod kromekover;
pub mod limiter;
pub mod normalizer;
pub mod renderer;
pub mod robots;
pub mod scheduler;
pub mod utils;

pub use browser_pool::{BrowserPool, BrowserPoolConfig, PooledBrowserGuard};
pub use config::{DepthPolicy, EngineConfig, EngineConfigBuilder, ErrorBudget};
pub use engine::{Engine, EngineOutcome};
pub use error::{CrawlError, CrawlErrorKind, ErrorPhase, ErrorRecord};
pub use imurl::ImUrl;

/// Run a crawl to completion with the given configuration. Thin wrapper
/// around [`Engine::run`] for library consumers that don't need pause/
/// resume/cancel control during the run.
pub async fn crawl(config: EngineConfig) -> anyhow::Result<EngineOutcome> {
    Engine::new(config).run().await
}
