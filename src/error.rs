//! Crawl error taxonomy.
//!
//! One variant per error kind the crawl can encounter, independent of the
//! library it originated from. Each variant carries enough context to build
//! an `ErrorRecord` for the archive's error dataset and to decide whether the
//! failure is retryable and whether it is fatal to the whole run.

use std::path::PathBuf;

use thiserror::Error;

/// A single crawl error, tagged with the URL it occurred on where known.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("fetch failed for {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("render failed for {url}: {source}")]
    RenderFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("challenge detected for {url} (unresolved after {waited_ms}ms)")]
    ChallengeDetected { url: String, waited_ms: u64 },

    #[error("robots.txt disallows {url} (rule: {matched_rule:?})")]
    RobotsBlocked {
        url: String,
        matched_rule: Option<String>,
    },

    #[error("render timed out for {url} after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("validation failed writing dataset {dataset}: {message}")]
    ValidationFailed { dataset: String, message: String },

    #[error("write I/O error at {path}: {source}")]
    WriteIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("browser fatal: {message}")]
    BrowserFatal { message: String },

    #[error("crawl canceled")]
    Canceled,
}

/// Error kind tag, independent of the context carried by [`CrawlError`].
///
/// Used for error-record serialization (`kind` field) and for the
/// retryable/fatal lookup tables below, without needing to match on (and
/// thus destructure) the full `CrawlError` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlErrorKind {
    FetchFailed,
    RenderFailed,
    ChallengeDetected,
    RobotsBlocked,
    Timeout,
    ValidationFailed,
    WriteIo,
    BrowserFatal,
    Canceled,
}

impl CrawlErrorKind {
    /// Whether this kind may legitimately be retried during an attempt loop.
    ///
    /// This is distinct from "fatal": a retryable-but-exhausted fetch still
    /// only counts toward the error budget, it does not abort the crawl.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(self, Self::FetchFailed | Self::RenderFailed)
    }

    /// Whether this kind aborts the whole crawl (vs. counting toward `max_errors`).
    #[must_use]
    pub fn fatal(self) -> bool {
        matches!(self, Self::ValidationFailed | Self::WriteIo | Self::BrowserFatal)
    }

    /// Process exit code associated with this kind when it is the terminal
    /// reason the crawl stopped. Non-fatal kinds never determine the exit
    /// code directly; they only contribute to the error budget.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ValidationFailed => 5,
            Self::WriteIo => 4,
            Self::BrowserFatal => 3,
            Self::Canceled => 10,
            _ => 2,
        }
    }
}

impl CrawlError {
    #[must_use]
    pub fn kind(&self) -> CrawlErrorKind {
        match self {
            Self::FetchFailed { .. } => CrawlErrorKind::FetchFailed,
            Self::RenderFailed { .. } => CrawlErrorKind::RenderFailed,
            Self::ChallengeDetected { .. } => CrawlErrorKind::ChallengeDetected,
            Self::RobotsBlocked { .. } => CrawlErrorKind::RobotsBlocked,
            Self::Timeout { .. } => CrawlErrorKind::Timeout,
            Self::ValidationFailed { .. } => CrawlErrorKind::ValidationFailed,
            Self::WriteIo { .. } => CrawlErrorKind::WriteIo,
            Self::BrowserFatal { .. } => CrawlErrorKind::BrowserFatal,
            Self::Canceled => CrawlErrorKind::Canceled,
        }
    }

    /// The URL this error is attributed to, if any (e.g. `Canceled` has none).
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::FetchFailed { url, .. }
            | Self::RenderFailed { url, .. }
            | Self::ChallengeDetected { url, .. }
            | Self::RobotsBlocked { url, .. }
            | Self::Timeout { url, .. } => Some(url),
            Self::ValidationFailed { .. } | Self::WriteIo { .. } | Self::BrowserFatal { .. } | Self::Canceled => None,
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        self.kind().retryable()
    }

    #[must_use]
    pub fn fatal(&self) -> bool {
        self.kind().fatal()
    }
}

/// Which stage of a page's processing state machine an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Robots,
    Fetch,
    Render,
    Extract,
    Write,
}

/// A record of a single error, as written to the archive's error dataset.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    pub url_key: Option<String>,
    pub phase: ErrorPhase,
    pub kind: CrawlErrorKind,
    pub message: String,
    pub host: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub attempt: u32,
    pub retryable: bool,
}

impl ErrorRecord {
    #[must_use]
    pub fn from_error(url_key: Option<String>, phase: ErrorPhase, error: &CrawlError, attempt: u32) -> Self {
        let url = error.url().unwrap_or_default().to_string();
        let host = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            url,
            url_key,
            phase,
            kind: error.kind(),
            message: error.to_string(),
            host,
            occurred_at: chrono::Utc::now(),
            attempt,
            retryable: error.retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_map_to_spec_exit_codes() {
        assert_eq!(CrawlErrorKind::ValidationFailed.exit_code(), 5);
        assert_eq!(CrawlErrorKind::WriteIo.exit_code(), 4);
        assert_eq!(CrawlErrorKind::BrowserFatal.exit_code(), 3);
        assert_eq!(CrawlErrorKind::Canceled.exit_code(), 10);
        assert_eq!(CrawlErrorKind::FetchFailed.exit_code(), 2);
    }

    #[test]
    fn retryable_and_fatal_are_disjoint_per_kind() {
        for kind in [
            CrawlErrorKind::FetchFailed,
            CrawlErrorKind::RenderFailed,
            CrawlErrorKind::ChallengeDetected,
            CrawlErrorKind::RobotsBlocked,
            CrawlErrorKind::Timeout,
            CrawlErrorKind::ValidationFailed,
            CrawlErrorKind::WriteIo,
            CrawlErrorKind::BrowserFatal,
            CrawlErrorKind::Canceled,
        ] {
            assert!(!(kind.retryable() && kind.fatal()));
        }
    }

    #[test]
    fn error_record_captures_url_and_kind() {
        let err = CrawlError::RobotsBlocked {
            url: "https://example.com/private".into(),
            matched_rule: Some("/private".into()),
        };
        let record = ErrorRecord::from_error(Some("abc123".into()), ErrorPhase::Robots, &err, 1);
        assert_eq!(record.url, "https://example.com/private");
        assert_eq!(record.host, "example.com");
        assert_eq!(record.kind, CrawlErrorKind::RobotsBlocked);
        assert!(!record.retryable);
    }
}
