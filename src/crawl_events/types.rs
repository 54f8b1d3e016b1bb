//! Event type definitions for the crawl event system
//!
//! This module contains the tagged-variant event union emitted to the NDJSON
//! event log and broadcast to in-process subscribers (progress bars, test
//! harnesses, the observability consumer).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Reason for event bus shutdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// Crawl completed successfully
    CrawlCompleted,
    /// Crawl encountered an error
    Error(String),
    /// Crawl was cancelled by user
    Cancelled,
}

/// Why a crawl run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Queue drained naturally.
    Finished,
    /// User requested cancellation.
    Manual,
    /// `max_errors` threshold reached.
    ErrorBudget,
    /// `max_pages` / `max_depth` cap reached.
    Capped,
}

/// Outcome of a robots.txt check for a single URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsDecisionKind {
    Allowed,
    Disallowed,
}

/// Where a robots.txt ruling came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsSource {
    Cache,
    Fetched,
}

/// Tagged-variant event union emitted throughout the crawl lifecycle.
///
/// Every variant carries its own explicit fields rather than a shared,
/// evolving payload bag; the observability consumer pattern-matches the tag
/// instead of probing optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// Emitted once when a crawl session starts.
    #[serde(rename = "crawl.started")]
    CrawlStarted {
        start_url: String,
        output_dir: PathBuf,
        max_depth: u32,
        concurrency: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted roughly once per second while the crawl is running.
    #[serde(rename = "crawl.heartbeat")]
    CrawlHeartbeat {
        pages_crawled: u64,
        pages_queued: u64,
        elapsed_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted roughly every 5 seconds with scheduler/resource internals.
    #[serde(rename = "crawl.observability")]
    CrawlObservability {
        queue_depth: u64,
        in_flight: u64,
        per_host_queue_sizes: HashMap<String, u64>,
        throttled_hosts: Vec<String>,
        current_rps: f64,
        memory_rss_mb: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted after a single URL finishes processing (success or failure).
    #[serde(rename = "crawl.page_processed")]
    CrawlPageProcessed {
        url: String,
        url_key: String,
        depth: u32,
        status: PageOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
        metadata: PageCrawlMetadata,
    },

    /// Emitted whenever a durable checkpoint snapshot is written.
    #[serde(rename = "crawl.checkpoint")]
    CrawlCheckpoint {
        pages_crawled: u64,
        queue_depth: u64,
        checkpoint_path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted whenever an `ErrorRecord` is appended to the error dataset.
    #[serde(rename = "crawl.error")]
    CrawlError {
        url: String,
        kind: String,
        message: String,
        retryable: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted when the scheduler enters or leaves a backpressure pause.
    #[serde(rename = "crawl.backpressure")]
    CrawlBackpressure {
        engaged: bool,
        memory_rss_mb: u64,
        high_water_mb: u64,
        low_water_mb: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One record per robots.txt decision made for a URL.
    #[serde(rename = "robots_decision")]
    RobotsDecision {
        url: String,
        decision: RobotsDecisionKind,
        matched_rule: Option<String>,
        source: RobotsSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Emitted once when the entire crawl session ends.
    #[serde(rename = "crawl.finished")]
    CrawlFinished {
        total_pages: u64,
        total_errors: u64,
        reason: CompletionReason,
        duration: std::time::Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cache hit - page skipped because its manifest entry is still fresh.
    CacheHit {
        url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Signals that the event bus is shutting down.
    ///
    /// Subscribers should exit their event loops when receiving this event.
    Shutdown {
        reason: ShutdownReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Per-URL terminal outcome recorded on `crawl.page_processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageOutcome {
    Success,
    Failed,
    Skipped,
}

/// Metadata about a single processed page, attached to `crawl.page_processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCrawlMetadata {
    /// Size of the fetched/rendered HTML content in bytes.
    pub html_size: usize,
    /// Size of the page's compressed JSONL part contribution in bytes.
    pub compressed_size: usize,
    /// Number of links discovered on the page.
    pub links_found: usize,
    /// Number of links that passed scope/pattern filters and were enqueued.
    pub links_enqueued: usize,
    /// Whether a screenshot was captured for this page.
    pub screenshot_captured: bool,
    /// Whether a favicon was captured for this page.
    pub favicon_captured: bool,
    /// Time taken to process the page end to end.
    pub processing_duration: std::time::Duration,
}

/// Result of publishing a batch of events.
///
/// Provides detailed information about batch publication success/failure.
/// Unlike a Result type, this always represents successful execution of the
/// batch operation itself - the fields indicate how many individual events
/// succeeded or failed within the batch.
///
/// # Best-Effort Semantics
///
/// The event bus uses best-effort delivery. All events in the batch are attempted
/// regardless of individual failures. This struct transparently reports what happened
/// so callers can make informed decisions about partial success scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPublishResult {
    /// Total number of events in the batch
    pub total: usize,

    /// Number of events successfully published
    pub published: usize,

    /// Number of events that failed to publish (no active subscribers)
    pub failed: usize,

    /// Peak subscriber count observed during batch
    pub max_subscribers: usize,
}

impl BatchPublishResult {
    /// Check if all events were successfully published
    ///
    /// Returns true only if published == total and failed == 0
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.published == self.total && self.failed == 0
    }

    /// Check if any events failed to publish
    ///
    /// Returns true if failed > 0
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Calculate success rate as a percentage
    ///
    /// Returns 100.0 if total is 0 (empty batch), otherwise (published / total) * 100.0
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.published as f64 / self.total as f64) * 100.0
    }
}

/// Helper constructors for creating common events, each stamping its own timestamp.
impl CrawlEvent {
    #[must_use]
    pub fn crawl_started(
        start_url: String,
        output_dir: PathBuf,
        max_depth: u32,
        concurrency: usize,
    ) -> Self {
        Self::CrawlStarted {
            start_url,
            output_dir,
            max_depth,
            concurrency,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn heartbeat(pages_crawled: u64, pages_queued: u64, elapsed_ms: u64) -> Self {
        Self::CrawlHeartbeat {
            pages_crawled,
            pages_queued,
            elapsed_ms,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn observability(
        queue_depth: u64,
        in_flight: u64,
        per_host_queue_sizes: HashMap<String, u64>,
        throttled_hosts: Vec<String>,
        current_rps: f64,
        memory_rss_mb: u64,
    ) -> Self {
        Self::CrawlObservability {
            queue_depth,
            in_flight,
            per_host_queue_sizes,
            throttled_hosts,
            current_rps,
            memory_rss_mb,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn page_processed(
        url: String,
        url_key: String,
        depth: u32,
        status: PageOutcome,
        metadata: PageCrawlMetadata,
    ) -> Self {
        Self::CrawlPageProcessed {
            url,
            url_key,
            depth,
            status,
            timestamp: chrono::Utc::now(),
            metadata,
        }
    }

    #[must_use]
    pub fn checkpoint(pages_crawled: u64, queue_depth: u64, checkpoint_path: PathBuf) -> Self {
        Self::CrawlCheckpoint {
            pages_crawled,
            queue_depth,
            checkpoint_path,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn error(url: String, kind: String, message: String, retryable: bool) -> Self {
        Self::CrawlError {
            url,
            kind,
            message,
            retryable,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn backpressure(engaged: bool, memory_rss_mb: u64, high_water_mb: u64, low_water_mb: u64) -> Self {
        Self::CrawlBackpressure {
            engaged,
            memory_rss_mb,
            high_water_mb,
            low_water_mb,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn robots_decision(
        url: String,
        decision: RobotsDecisionKind,
        matched_rule: Option<String>,
        source: RobotsSource,
    ) -> Self {
        Self::RobotsDecision {
            url,
            decision,
            matched_rule,
            source,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn finished(
        total_pages: u64,
        total_errors: u64,
        reason: CompletionReason,
        duration: std::time::Duration,
    ) -> Self {
        Self::CrawlFinished {
            total_pages,
            total_errors,
            reason,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn cache_hit(url: String) -> Self {
        Self::CacheHit {
            url,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}
