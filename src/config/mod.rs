//! Crawl configuration: a single explicit record enumerating every option
//! and its effect, built via [`EngineConfigBuilder`].
//!
//! A plain builder rather than a typestate one: only `seeds` is required
//! here, so a typestate per-field encoding would add ceremony without
//! adding safety.

pub mod types;

pub use types::{DepthPolicy, EngineConfig, EngineConfigBuilder, ErrorBudget};
