//! The scheduler: queue, visited set, in-flight set, and completion
//! decision (§4.7). Owns everything a checkpoint needs to snapshot and a
//! resume needs to rebuild, but stays agnostic of fetching/rendering —
//! `engine` drives dispatch against the state this module exposes.
//!
//! Concurrent crawl state lives in a `DashSet<String>`/`DashMap` pair so
//! dispatch never blocks on a single mutex, organized into a BFS depth-band
//! queue, a `UrlKey`-keyed visited set, and the priority-ordered
//! completion-reason decision §4.7 and §8 (P4) require.

mod completion;
mod queue;

pub use completion::{decide_completion, CompletionInputs};
pub use queue::DepthBandQueue;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::normalizer::UrlKey;

/// One entry ever enqueued. Depth 0 = seed. Never mutated after creation
/// (§3's queue-entry lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub url: String,
    pub normalized_url: String,
    pub url_key: String,
    pub depth: u32,
    pub discovered_from: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl QueueEntry {
    #[must_use]
    pub fn seed(url: String, normalized_url: String, url_key: UrlKey) -> Self {
        Self {
            url,
            normalized_url,
            url_key: url_key.to_hex(),
            depth: 0,
            discovered_from: None,
            discovered_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn discovered(
        url: String,
        normalized_url: String,
        url_key: UrlKey,
        depth: u32,
        discovered_from: String,
    ) -> Self {
        Self {
            url,
            normalized_url,
            url_key: url_key.to_hex(),
            depth,
            discovered_from: Some(discovered_from),
            discovered_at: Utc::now(),
        }
    }
}

/// An in-flight attempt: host/phase/started-at state for one dispatched
/// entry, keyed by url_key in [`Scheduler::in_flight`].
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub url: String,
    pub depth: u32,
    pub host: String,
    pub discovered_from: Option<String>,
    pub started_at: Instant,
    pub phase: Phase,
}

/// Per-attempt state machine (§4.7's state-machine diagram). Terminal
/// states (`Done`, `Errored`) are never observed in the map — a terminal
/// transition removes the entry instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dispatched,
    Fetching,
    Rendering,
    Extracting,
    Writing,
}

/// Scheduler state: the BFS queue, the visited set (url_keys ever
/// dequeued), the in-flight map, and a running enqueued-count used for the
/// `max_pages` enqueue-limiting rule (§4.7 step 4).
pub struct Scheduler {
    queue: Mutex<DepthBandQueue>,
    visited: DashSet<String>,
    in_flight: dashmap::DashMap<String, InFlightEntry>,
    enqueued_count: AtomicU64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(DepthBandQueue::new()),
            visited: DashSet::new(),
            in_flight: dashmap::DashMap::new(),
            enqueued_count: AtomicU64::new(0),
        }
    }

    /// Seed the queue. Each seed counts toward `enqueued_count` but is never
    /// itself subject to the `max_pages` enqueue limit (a crawl with
    /// `max_pages < seeds.len()` still attempts every seed).
    pub fn seed(&self, entries: Vec<QueueEntry>) {
        let mut queue = self.queue.lock().unwrap();
        for entry in entries {
            queue.push(entry);
            self.enqueued_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Enqueue a newly discovered entry, honoring the `max_pages`
    /// enqueue-limiting invariant: when `max_pages > 0`, refuse to enqueue
    /// once `visited + enqueued` would exceed it. Returns whether the entry
    /// was actually enqueued.
    pub fn try_enqueue(&self, entry: QueueEntry, max_pages: u64) -> bool {
        if self.visited.contains(&entry.url_key) || self.in_flight.contains_key(&entry.url_key) {
            return false;
        }
        let mut queue = self.queue.lock().unwrap();
        if queue.contains(&entry.url_key) {
            return false;
        }
        let visited_len = self.visited.len() as u64;
        let enqueued = self.enqueued_count.load(Ordering::Relaxed);
        if max_pages > 0 && visited_len + enqueued + 1 > max_pages {
            return false;
        }
        queue.push(entry);
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Re-enqueue a deferred entry at the head of its own depth band (§4.7
    /// step d): a deferred entry already lost its dispatch turn once to
    /// rate limiting, so it goes back in front of its band's remaining
    /// untried entries rather than behind them. Trades a small risk of
    /// starving later hosts under heavy per-host throttling for fairness
    /// to whichever host is already mid-crawl.
    ///
    /// The entry was already marked visited by the [`Scheduler::dequeue`]
    /// that handed it out; undo that here so its next dequeue doesn't get
    /// silently treated as a duplicate and dropped (same reasoning as the
    /// in-flight re-entries in [`Scheduler::restore`]).
    pub fn requeue_deferred(&self, entry: QueueEntry) {
        self.visited.remove(&entry.url_key);
        self.queue.lock().unwrap().push_front(entry);
    }

    /// Dequeue the next entry in BFS order (ascending depth, FIFO within a
    /// depth band), marking it visited. Entries already visited (can happen
    /// if the same url_key was enqueued more than once before either
    /// dequeue) are silently dropped and the caller should loop. The entry
    /// is not yet in-flight — call [`Scheduler::mark_dispatched`] once the
    /// caller knows the entry's host.
    pub fn dequeue(&self) -> Option<DequeueOutcome> {
        let entry = self.queue.lock().unwrap().pop()?;
        if !self.visited.insert(entry.url_key.clone()) {
            return Some(DequeueOutcome::AlreadyVisited);
        }
        Some(DequeueOutcome::Dispatch(entry))
    }

    /// Record `entry` as in-flight against `host`, once the caller has
    /// resolved it. Called immediately after a successful [`Scheduler::dequeue`],
    /// before the limiter/robots/fetch steps begin.
    pub fn mark_dispatched(&self, entry: &QueueEntry, host: String) {
        self.in_flight.insert(
            entry.url_key.clone(),
            InFlightEntry {
                url: entry.url.clone(),
                depth: entry.depth,
                host,
                discovered_from: entry.discovered_from.clone(),
                started_at: Instant::now(),
                phase: Phase::Dispatched,
            },
        );
    }

    /// Advance an in-flight entry's phase (best-effort; a missing entry is
    /// not an error, since cancellation can remove it concurrently).
    pub fn set_phase(&self, url_key: &str, phase: Phase) {
        if let Some(mut entry) = self.in_flight.get_mut(url_key) {
            entry.phase = phase;
        }
    }

    /// Terminal transition: remove from in-flight (both `done` and
    /// `errored` call this — §4.7's state machine treats both as terminal).
    pub fn complete(&self, url_key: &str) {
        self.in_flight.remove(url_key);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    #[must_use]
    pub fn in_flight_is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.len() as u64
    }

    #[must_use]
    pub fn queue_depth(&self) -> u64 {
        self.queue.lock().unwrap().len() as u64
    }

    #[must_use]
    pub fn visited_count(&self) -> u64 {
        self.visited.len() as u64
    }

    /// Per-host count of entries sitting in the queue, for observability
    /// (`crawl.observability`'s `per_host_queue_sizes`).
    #[must_use]
    pub fn per_host_in_flight(&self) -> std::collections::HashMap<String, u64> {
        let mut counts = std::collections::HashMap::new();
        for entry in self.in_flight.iter() {
            *counts.entry(entry.host.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Snapshot everything needed for a checkpoint: remaining queue
    /// entries, visited url_keys, and in-flight entries (as
    /// `(url_key, InFlightEntry)` pairs, treated as never-completed on
    /// resume per §4.9).
    #[must_use]
    pub fn snapshot(&self) -> (Vec<QueueEntry>, Vec<String>, Vec<(String, InFlightEntry)>) {
        let queue = self.queue.lock().unwrap().snapshot();
        let visited = self.visited.iter().map(|k| k.clone()).collect();
        let in_flight = self
            .in_flight
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        (queue, visited, in_flight)
    }

    /// Rebuild scheduler state from a checkpoint. In-flight entries found
    /// at snapshot time are treated as never-completed and re-enqueued at
    /// their original depth ahead of the persisted queue (§4.9).
    pub fn restore(&self, queue: Vec<QueueEntry>, visited: Vec<String>, in_flight_reentries: Vec<QueueEntry>) {
        let mut q = self.queue.lock().unwrap();
        self.visited.clear();
        for key in visited {
            self.visited.insert(key);
        }
        q.clear();
        for entry in in_flight_reentries {
            self.visited.remove(&entry.url_key);
            q.push(entry);
        }
        for entry in queue {
            q.push(entry);
        }
        self.enqueued_count.store(q.len() as u64, Ordering::Relaxed);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single dequeue attempt.
pub enum DequeueOutcome {
    /// A valid, not-yet-visited entry ready for dispatch.
    Dispatch(QueueEntry),
    /// The entry had already been visited (enqueued twice before either
    /// dequeue); the caller should immediately try the next dequeue.
    AlreadyVisited,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, depth: u32) -> QueueEntry {
        let key = UrlKey::from_canonical(url);
        QueueEntry {
            depth,
            ..QueueEntry::seed(url.to_string(), url.to_string(), key)
        }
    }

    #[test]
    fn dequeues_in_bfs_order_across_depth_bands() {
        let scheduler = Scheduler::new();
        scheduler.seed(vec![entry("https://a.example/", 0)]);
        assert!(scheduler.try_enqueue(entry("https://b.example/", 1), 0));
        assert!(scheduler.try_enqueue(entry("https://c.example/", 0), 0));

        let first = match scheduler.dequeue().unwrap() {
            DequeueOutcome::Dispatch(e) => e,
            DequeueOutcome::AlreadyVisited => panic!("unexpected"),
        };
        scheduler.mark_dispatched(&first, "a.example".to_string());
        assert_eq!(first.depth, 0);
        assert_eq!(scheduler.in_flight_count(), 1);
    }

    #[test]
    fn exactly_once_per_url_key() {
        let scheduler = Scheduler::new();
        let a = entry("https://a.example/", 0);
        let a_dup = entry("https://a.example/", 0);
        scheduler.seed(vec![a]);
        assert!(!scheduler.try_enqueue(a_dup, 0));
    }

    #[test]
    fn max_pages_enqueue_limit_is_enforced() {
        let scheduler = Scheduler::new();
        scheduler.seed(vec![entry("https://a.example/", 0)]);
        let _ = scheduler.dequeue();
        // visited=1, enqueued=1 (seed), max_pages=1: no further enqueue permitted.
        assert!(!scheduler.try_enqueue(entry("https://b.example/", 1), 1));
    }

    #[test]
    fn zero_max_pages_means_unlimited() {
        let scheduler = Scheduler::new();
        for i in 0..50 {
            assert!(scheduler.try_enqueue(entry(&format!("https://a.example/{i}"), 1), 0));
        }
    }

    #[test]
    fn complete_removes_from_in_flight() {
        let scheduler = Scheduler::new();
        scheduler.seed(vec![entry("https://a.example/", 0)]);
        let entry = match scheduler.dequeue().unwrap() {
            DequeueOutcome::Dispatch(e) => e,
            DequeueOutcome::AlreadyVisited => panic!("unexpected"),
        };
        scheduler.mark_dispatched(&entry, "a.example".to_string());
        assert!(!scheduler.in_flight_is_empty());
        scheduler.complete(&entry.url_key);
        assert!(scheduler.in_flight_is_empty());
    }

    #[test]
    fn checkpoint_round_trips_queue_and_visited() {
        let scheduler = Scheduler::new();
        scheduler.seed(vec![entry("https://a.example/", 0)]);
        scheduler.try_enqueue(entry("https://b.example/", 1), 0);
        let _ = scheduler.dequeue();

        let (queue, visited, _in_flight) = scheduler.snapshot();
        let restored = Scheduler::new();
        restored.restore(queue, visited, vec![]);
        assert_eq!(restored.queue_depth(), 1);
        assert_eq!(restored.visited_count(), 1);
    }
}
