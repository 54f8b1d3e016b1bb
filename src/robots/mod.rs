//! Robots.txt cache and RFC 9309 rule evaluation.
//!
//! Fetch-parse-cache per host ("no robots.txt or error → allow all"), with
//! a concurrent-map + single-flight idiom (`DashMap<_, Arc<OnceCell<_>>>`)
//! so concurrent lookups for the same never-yet-fetched host coalesce into
//! one fetch.

mod fetch;
mod rules;

pub use rules::{RobotsRules, RuleMatch};

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex as StdMutex;
use tokio::sync::OnceCell;
use url::Url;

use crate::crawl_events::{CrawlEvent, CrawlEventBus, RobotsDecisionKind, RobotsSource};

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_CACHED_ORIGINS: usize = 1000;

/// A single cached robots.txt entry for one origin.
#[derive(Debug, Clone)]
pub struct RobotsEntry {
    pub rules: RobotsRules,
    pub fetched_at: Instant,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl RobotsEntry {
    fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > DEFAULT_TTL
    }
}

/// Outcome of a single `allowed()` check.
#[derive(Debug, Clone)]
pub struct AllowedOutcome {
    pub allow: bool,
    pub matched_rule: Option<String>,
    pub fetched_fresh: bool,
}

/// Per-origin single-flight robots.txt cache.
pub struct RobotsCache {
    http: reqwest::Client,
    user_agent: String,
    entries: DashMap<String, Arc<OnceCell<RobotsEntry>>>,
    /// LRU eviction order, guarded separately since `DashMap` has no LRU of its own.
    lru: StdMutex<LruCache<String, ()>>,
    events: Option<Arc<CrawlEventBus>>,
}

impl RobotsCache {
    #[must_use]
    pub fn new(http: reqwest::Client, user_agent: String, events: Option<Arc<CrawlEventBus>>) -> Self {
        Self {
            http,
            user_agent,
            entries: DashMap::new(),
            lru: StdMutex::new(LruCache::new(
                NonZeroUsize::new(MAX_CACHED_ORIGINS).expect("constant is non-zero"),
            )),
            events,
        }
    }

    /// Check whether `url` may be crawled, fetching and caching that
    /// origin's robots.txt on first sighting (or on TTL expiry).
    pub async fn allowed(&self, url: &Url) -> anyhow::Result<AllowedOutcome> {
        let origin = origin_key(url);
        let cell = self.cell_for(&origin);

        let mut fetched_fresh = false;
        let entry = cell
            .get_or_try_init(|| async {
                fetched_fresh = true;
                fetch::fetch_robots(&self.http, &origin, &self.user_agent).await
            })
            .await?;

        let (entry, source) = if entry.is_stale() {
            fetched_fresh = true;
            let refreshed = fetch::revalidate(&self.http, &origin, &self.user_agent, entry).await?;
            self.entries
                .insert(origin.clone(), Arc::new(OnceCell::new_with(Some(refreshed.clone()))));
            (refreshed, RobotsSource::Fetched)
        } else {
            (
                entry.clone(),
                if fetched_fresh {
                    RobotsSource::Fetched
                } else {
                    RobotsSource::Cache
                },
            )
        };

        let matched = entry.rules.evaluate(&self.user_agent, url.path());
        let outcome = AllowedOutcome {
            allow: matched.allow,
            matched_rule: matched.rule.clone(),
            fetched_fresh,
        };

        if let Some(bus) = &self.events {
            let decision = if outcome.allow {
                RobotsDecisionKind::Allowed
            } else {
                RobotsDecisionKind::Disallowed
            };
            let _ = bus
                .publish(CrawlEvent::robots_decision(
                    url.as_str().to_string(),
                    decision,
                    outcome.matched_rule.clone(),
                    source,
                ))
                .await;
        }

        Ok(outcome)
    }

    fn cell_for(&self, origin: &str) -> Arc<OnceCell<RobotsEntry>> {
        if let Some(existing) = self.entries.get(origin) {
            self.touch(origin);
            return existing.clone();
        }
        let cell = Arc::new(OnceCell::new());
        self.entries.insert(origin.to_string(), cell.clone());
        self.touch(origin);
        self.evict_if_needed();
        cell
    }

    fn touch(&self, origin: &str) {
        if let Ok(mut lru) = self.lru.lock() {
            lru.put(origin.to_string(), ());
        }
    }

    fn evict_if_needed(&self) {
        let Ok(mut lru) = self.lru.lock() else { return };
        while lru.len() > MAX_CACHED_ORIGINS {
            if let Some((oldest, _)) = lru.pop_lru() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

fn origin_key(url: &Url) -> String {
    format!(
        "{}://{}",
        url.scheme(),
        url.host_str().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_key_ignores_path_and_query() {
        let a = Url::parse("https://example.com/a?x=1").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        assert_eq!(origin_key(&a), origin_key(&b));
    }
}
