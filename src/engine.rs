//! The engine: wires the scheduler, limiter, robots cache, fetcher,
//! renderer, extractors, archive writer, checkpointer, browser pool, and
//! event bus into a single `start/pause/resume/cancel` program (§5/§6).
//!
//! Dispatch runs as a single `FuturesUnordered`-based worker loop: one
//! shared queue, a bounded number of in-flight futures, no per-worker task
//! spawned ahead of time. Heartbeat and observability run as side tasks
//! alongside dispatch rather than interleaved into it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::archive::{
    AccessibilityRecordPersisted, ArchiveWriter, AssetRecordPersisted, EdgeRecord, MediaPaths, PageRecord,
};
use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
use crate::checkpoint::{self, Checkpoint, Counters, HostBucketSnapshot, InFlightSnapshot, PartPointer};
use crate::config::EngineConfig;
use crate::crawl_events::{
    CompletionReason, CrawlEvent, CrawlEventBus, EventLogWriter, PageCrawlMetadata, PageOutcome, ShutdownReason,
};
use crate::error::{CrawlError, CrawlErrorKind, ErrorPhase, ErrorRecord};
use crate::extractors::{self, ExtractionResult};
use crate::fetcher;
use crate::limiter::CrawlLimiter;
use crate::normalizer::{self, NormalizerConfig, UrlKey};
use crate::renderer::{self, RenderMode, RenderOutput};
use crate::robots::RobotsCache;
use crate::scheduler::{decide_completion, CompletionInputs, QueueEntry, Scheduler};

/// Result of a completed run, returned to both the library wrapper and the
/// CLI (which maps `exit_code` directly to `std::process::exit`).
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub archive_path: PathBuf,
    pub exit_code: i32,
    pub completion_reason: CompletionReason,
    pub pages_crawled: u64,
    pub errors_count: u64,
}

/// Shared, cloneable context every in-flight page-processing future closes
/// over. Cheap to clone (everything inside is an `Arc` or a plain value).
#[derive(Clone)]
struct Context {
    config: Arc<EngineConfig>,
    scheduler: Arc<Scheduler>,
    limiter: Arc<CrawlLimiter>,
    robots: Arc<RobotsCache>,
    http: reqwest::Client,
    events: Arc<CrawlEventBus>,
    writer: Arc<ArchiveWriter>,
    browser_pool: Option<Arc<BrowserPool>>,
    normalizer_config: Arc<NormalizerConfig>,
    errors_count: Arc<AtomicU64>,
    pages_crawled: Arc<AtomicU64>,
    media_pages_since_recycle: Arc<AtomicU64>,
}

/// The crawl engine. Holds only configuration and control-surface state
/// until [`Engine::run`] builds the rest of the pipeline.
pub struct Engine {
    config: EngineConfig,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    pause_changed: Arc<Notify>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            pause_changed: Arc::new(Notify::new()),
        }
    }

    /// Request cancellation. Workers stop dispatching new entries; in-flight
    /// work is given `shutdown_grace_ms` to finish before being abandoned.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.pause_changed.notify_waiters();
    }

    /// Pause dispatch (in-flight work drains but no new entries start).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume dispatch after a [`Engine::pause`].
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.pause_changed.notify_waiters();
    }

    pub async fn run(self) -> anyhow::Result<EngineOutcome> {
        let crawl_started_at = Utc::now();
        let crawl_id = uuid::Uuid::new_v4().to_string();

        let out_path = self.config.resolved_out_path(crawl_started_at);
        let staging_dir = out_path.with_extension("");
        if let Some(parent) = staging_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let http = reqwest::Client::builder()
            .user_agent(self.config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        let events = Arc::new(CrawlEventBus::new(4096));
        let event_log = match &self.config.event_log_path {
            Some(path) => Some(EventLogWriter::spawn(&events, path).await?),
            None => None,
        };

        let scheduler = Arc::new(Scheduler::new());
        let limiter = Arc::new(CrawlLimiter::new(self.config.global_rps, self.config.per_host_rps));
        let robots = Arc::new(RobotsCache::new(http.clone(), self.config.user_agent.clone(), Some(events.clone())));
        let normalizer_config = Arc::new(self.config.normalizer_config()?);

        let errors_count = Arc::new(AtomicU64::new(0));
        let pages_crawled = Arc::new(AtomicU64::new(0));

        let mut resumed_host_tokens: Vec<(String, f64)> = Vec::new();
        if let Some(resume_dir) = &self.config.resume {
            let loaded = checkpoint::load(resume_dir)?;
            checkpoint::truncate_parts_to_checkpoint(&loaded)?;
            let queue = loaded.queue;
            let visited = loaded.visited;
            let in_flight_reentries: Vec<QueueEntry> = loaded
                .in_flight
                .iter()
                .map(|e| QueueEntry::discovered(
                    e.url.clone(),
                    e.url.clone(),
                    UrlKey::from_canonical(&e.url),
                    e.depth,
                    e.discovered_from.clone().unwrap_or_default(),
                ))
                .collect();
            scheduler.restore(queue, visited, in_flight_reentries);
            errors_count.store(loaded.counters.errors_count, Ordering::SeqCst);
            pages_crawled.store(loaded.counters.pages_crawled, Ordering::SeqCst);
            resumed_host_tokens = loaded
                .host_buckets
                .into_iter()
                .map(|(host, snap)| (host, snap.tokens))
                .collect();
        } else {
            let mut seeds = Vec::new();
            for seed_url in &self.config.seeds {
                match normalizer::normalize(seed_url, &url::Url::parse(seed_url)?, &normalizer_config) {
                    Ok(outcome) => seeds.push(QueueEntry::seed(
                        outcome.normalized_url.as_str().to_string(),
                        outcome.normalized_url.as_str().to_string(),
                        outcome.url_key,
                    )),
                    Err(reason) => {
                        tracing::warn!("seed {seed_url} rejected during normalization: {reason:?}");
                    }
                }
            }
            scheduler.seed(seeds);
        }
        let _ = resumed_host_tokens; // host-bucket token counts are advisory; buckets re-warm naturally.

        let writer = Arc::new(ArchiveWriter::open(&staging_dir)?);

        let browser_pool = if self.config.mode == RenderMode::Raw {
            None
        } else {
            let pool = BrowserPool::new(BrowserPoolConfig::default());
            pool.start().await?;
            Some(pool)
        };

        events
            .publish(CrawlEvent::crawl_started(
                self.config.seeds.first().cloned().unwrap_or_default(),
                staging_dir.clone(),
                depth_hint(&self.config),
                self.config.concurrency,
            ))
            .await
            .ok();

        let ctx = Context {
            config: Arc::new(self.config.clone()),
            scheduler: scheduler.clone(),
            limiter,
            robots,
            http,
            events: events.clone(),
            writer: writer.clone(),
            browser_pool: browser_pool.clone(),
            normalizer_config,
            errors_count: errors_count.clone(),
            pages_crawled: pages_crawled.clone(),
            media_pages_since_recycle: Arc::new(AtomicU64::new(0)),
        };

        let side_tasks_cancel = self.cancel.clone();
        let heartbeat = tokio::spawn(heartbeat_loop(
            events.clone(),
            pages_crawled.clone(),
            scheduler.clone(),
            crawl_started_at,
            side_tasks_cancel.clone(),
        ));
        let observability = tokio::spawn(observability_loop(
            events.clone(),
            scheduler.clone(),
            self.config.global_rps,
            self.paused.clone(),
            self.config.rss_high_water_mb,
            self.config.rss_low_water_mb,
            side_tasks_cancel.clone(),
        ));

        let completion_reason = self
            .dispatch_loop(ctx.clone(), &staging_dir, &crawl_id)
            .await;

        side_tasks_cancel.store(true, Ordering::SeqCst);
        let _ = heartbeat.await;
        let _ = observability.await;

        if let Some(pool) = &browser_pool {
            let _ = pool.shutdown().await;
        }

        // Drop this run's context clone so the writer below is the sole
        // remaining `Arc` owner; every spawned page future has already
        // completed (the dispatch loop above only returns once drained).
        drop(ctx);

        writer.flush_and_sync()?;

        let render_modes_used = vec![self.config.mode];
        let robots_note = if self.config.respect_robots {
            None
        } else {
            Some("robots.txt was not honored for this crawl (respect_robots=false)".to_string())
        };
        let final_errors = errors_count.load(Ordering::SeqCst);
        let final_pages = pages_crawled.load(Ordering::SeqCst);
        let writer = Arc::try_unwrap(writer).unwrap_or_else(|arc| {
            panic!("archive writer still has {} outstanding references", Arc::strong_count(&arc))
        });
        let archive_path = writer.finalize(
            "atlas-crawl".to_string(),
            completion_reason,
            render_modes_used,
            self.config.respect_robots,
            robots_note,
            crawl_started_at,
            Vec::new(),
            |_summary| {},
        )?;

        events
            .publish(CrawlEvent::finished(
                final_pages,
                final_errors,
                completion_reason,
                Utc::now().signed_duration_since(crawl_started_at).to_std().unwrap_or_default(),
            ))
            .await
            .ok();
        events.shutdown_gracefully(ShutdownReason::CrawlCompleted).await;
        if let Some(log) = event_log {
            log.join().await;
        }

        let exit_code = match completion_reason {
            CompletionReason::ErrorBudget => 2,
            CompletionReason::Finished | CompletionReason::Capped | CompletionReason::Manual => 0,
        };

        Ok(EngineOutcome {
            archive_path,
            exit_code,
            completion_reason,
            pages_crawled: final_pages,
            errors_count: final_errors,
        })
    }

    /// The core `FuturesUnordered` dispatch loop (§5's worker model,
    /// collapsed into a single task rather than N pre-spawned workers: both
    /// give the same concurrency bound, but this form makes the completion
    /// check — which must run after every single page finishes, not on a
    /// fixed tick — trivial to get right).
    async fn dispatch_loop(&self, ctx: Context, staging_dir: &std::path::Path, crawl_id: &str) -> CompletionReason {
        let mut in_flight = FuturesUnordered::new();
        let mut last_checkpoint_pages = 0u64;

        loop {
            while in_flight.len() < ctx.config.concurrency
                && !self.cancel.load(Ordering::SeqCst)
                && !self.paused.load(Ordering::SeqCst)
            {
                match ctx.scheduler.dequeue() {
                    Some(crate::scheduler::DequeueOutcome::Dispatch(entry)) => {
                        let ctx = ctx.clone();
                        in_flight.push(Box::pin(process_entry(ctx, entry)));
                    }
                    Some(crate::scheduler::DequeueOutcome::AlreadyVisited) => continue,
                    None => break,
                }
            }

            if in_flight.is_empty() {
                let inputs = CompletionInputs {
                    manual_cancel: self.cancel.load(Ordering::SeqCst),
                    errors_count: ctx.errors_count.load(Ordering::SeqCst),
                    max_errors: ctx.config.max_errors,
                    pages_completed: ctx.pages_crawled.load(Ordering::SeqCst),
                    max_pages: ctx.config.max_pages,
                    queue_empty: ctx.scheduler.is_empty(),
                    in_flight_empty: ctx.scheduler.in_flight_is_empty(),
                };
                if let Some(reason) = decide_completion(inputs) {
                    return reason;
                }
                // Paused, backpressured, or momentarily starved; wait briefly.
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }

            if let Some(outcome) = in_flight.next().await {
                handle_page_outcome(&ctx, outcome).await;
            }

            let pages_now = ctx.pages_crawled.load(Ordering::SeqCst);
            if pages_now.saturating_sub(last_checkpoint_pages) >= ctx.config.checkpoint_interval {
                last_checkpoint_pages = pages_now;
                write_checkpoint(&ctx, staging_dir, crawl_id).await;
            }

            let inputs = CompletionInputs {
                manual_cancel: self.cancel.load(Ordering::SeqCst),
                errors_count: ctx.errors_count.load(Ordering::SeqCst),
                max_errors: ctx.config.max_errors,
                pages_completed: pages_now,
                max_pages: ctx.config.max_pages,
                queue_empty: ctx.scheduler.is_empty(),
                in_flight_empty: ctx.scheduler.in_flight_is_empty(),
            };
            if let Some(reason) = decide_completion(inputs) {
                if !in_flight.is_empty() {
                    let grace = Duration::from_millis(ctx.config.shutdown_grace_ms);
                    let _ = tokio::time::timeout(grace, async {
                        while let Some(outcome) = in_flight.next().await {
                            handle_page_outcome(&ctx, outcome).await;
                        }
                    })
                    .await;
                }
                return reason;
            }
        }
    }
}

fn depth_hint(config: &EngineConfig) -> u32 {
    match config.max_depth {
        crate::config::DepthPolicy::Bounded(n) => n,
        crate::config::DepthPolicy::SeedsOnly => 0,
        crate::config::DepthPolicy::Unlimited => u32::MAX,
    }
}

/// Result of [`process_entry_inner`]'s attempt to dispatch one entry:
/// either it ran to completion, or the rate limiter never granted a token
/// before the deadline and the entry was handed back to the scheduler.
enum DispatchOutcome {
    Completed { discovered: usize, enqueued: usize },
    Deferred,
}

/// Outcome of processing one queue entry, fed back into the dispatch loop
/// for counter/event bookkeeping.
struct PageOutcomeReport {
    url_key: String,
    depth: u32,
    success: bool,
    discovered_edges: usize,
    enqueued_edges: usize,
}

async fn process_entry(ctx: Context, entry: QueueEntry) -> PageOutcomeReport {
    let started = Instant::now();
    let host = url::Url::parse(&entry.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    ctx.scheduler.mark_dispatched(&entry, host.clone());

    let outcome = process_entry_inner(&ctx, &entry, &host).await;
    ctx.scheduler.complete(&entry.url_key);

    let success = match outcome {
        Ok(DispatchOutcome::Completed { discovered, enqueued }) => {
            ctx.pages_crawled.fetch_add(1, Ordering::SeqCst);
            let _ = ctx
                .events
                .publish(CrawlEvent::page_processed(
                    entry.url.clone(),
                    entry.url_key.clone(),
                    entry.depth,
                    PageOutcome::Success,
                    PageCrawlMetadata {
                        html_size: 0,
                        compressed_size: 0,
                        links_found: discovered,
                        links_enqueued: enqueued,
                        screenshot_captured: false,
                        favicon_captured: false,
                        processing_duration: started.elapsed(),
                    },
                ))
                .await;
            return PageOutcomeReport {
                url_key: entry.url_key,
                depth: entry.depth,
                success: true,
                discovered_edges: discovered,
                enqueued_edges: enqueued,
            };
        }
        Ok(DispatchOutcome::Deferred) => {
            // Already requeued at the head of its depth band by
            // `process_entry_inner`; not a page outcome and not an error,
            // so neither counter moves and no event is published.
            return PageOutcomeReport {
                url_key: entry.url_key,
                depth: entry.depth,
                success: false,
                discovered_edges: 0,
                enqueued_edges: 0,
            };
        }
        Err(err) => {
            ctx.errors_count.fetch_add(1, Ordering::SeqCst);
            let record = ErrorRecord::from_error(Some(entry.url_key.clone()), phase_for(&err), &err, 1);
            let _ = ctx.writer.write_error(&record);
            let _ = ctx
                .events
                .publish(CrawlEvent::error(
                    entry.url.clone(),
                    format!("{:?}", err.kind()),
                    err.to_string(),
                    err.retryable(),
                ))
                .await;
            let _ = ctx
                .events
                .publish(CrawlEvent::page_processed(
                    entry.url.clone(),
                    entry.url_key.clone(),
                    entry.depth,
                    PageOutcome::Failed,
                    PageCrawlMetadata {
                        html_size: 0,
                        compressed_size: 0,
                        links_found: 0,
                        links_enqueued: 0,
                        screenshot_captured: false,
                        favicon_captured: false,
                        processing_duration: started.elapsed(),
                    },
                ))
                .await;
            false
        }
    };

    PageOutcomeReport {
        url_key: entry.url_key,
        depth: entry.depth,
        success,
        discovered_edges: 0,
        enqueued_edges: 0,
    }
}

fn phase_for(err: &CrawlError) -> ErrorPhase {
    match err.kind() {
        CrawlErrorKind::RobotsBlocked => ErrorPhase::Robots,
        CrawlErrorKind::FetchFailed => ErrorPhase::Fetch,
        CrawlErrorKind::RenderFailed | CrawlErrorKind::ChallengeDetected | CrawlErrorKind::Timeout => {
            ErrorPhase::Render
        }
        CrawlErrorKind::ValidationFailed => ErrorPhase::Write,
        CrawlErrorKind::WriteIo | CrawlErrorKind::BrowserFatal | CrawlErrorKind::Canceled => ErrorPhase::Write,
    }
}

/// One page end to end: robots check, rate-limit acquisition, fetch/render,
/// extraction, archive writes, and link discovery/enqueue. Returns
/// [`DispatchOutcome::Deferred`] without touching the archive if the rate
/// limiter never granted a token before the deadline.
async fn process_entry_inner(ctx: &Context, entry: &QueueEntry, host: &str) -> Result<DispatchOutcome, CrawlError> {
    let page_url = url::Url::parse(&entry.url).map_err(|e| CrawlError::FetchFailed {
        url: entry.url.clone(),
        source: anyhow::anyhow!("invalid url: {e}"),
    })?;

    if ctx.config.respect_robots {
        let allowed = ctx
            .robots
            .allowed(&page_url)
            .await
            .map_err(|e| CrawlError::FetchFailed {
                url: entry.url.clone(),
                source: e,
            })?;
        if !allowed.allow {
            return Err(CrawlError::RobotsBlocked {
                url: entry.url.clone(),
                matched_rule: allowed.matched_rule,
            });
        }
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    let acquisition = ctx.limiter.acquire_before(host, deadline).await;
    if !acquisition.granted {
        // Backpressure per the limiter's contract (src/limiter/mod.rs):
        // the host (or global) bucket never recovered before the deadline.
        // Return the entry to the queue rather than fetching past budget.
        ctx.scheduler.requeue_deferred(entry.clone());
        return Ok(DispatchOutcome::Deferred);
    }

    let fetch_started_at = Utc::now();
    let (status, headers, body_bytes, dom_html, render_out): (u16, reqwest::header::HeaderMap, Vec<u8>, String, Option<RenderOutput>) =
        if ctx.config.mode == RenderMode::Raw {
            let response = fetcher::fetch(&ctx.http, &entry.url, ctx.config.render_timeout).await?;
            (response.status, response.headers, response.body.clone(), String::from_utf8_lossy(&response.body).into_owned(), None)
        } else {
            let pool = ctx.browser_pool.as_ref().expect("browser pool present for non-raw modes");
            let guard = pool.acquire().await.map_err(|e| CrawlError::BrowserFatal {
                message: e.to_string(),
            })?;
            let page = guard
                .browser()
                .new_page("about:blank")
                .await
                .map_err(|e| CrawlError::BrowserFatal {
                    message: e.to_string(),
                })?;
            let out = renderer::render(
                &page,
                &entry.url,
                ctx.config.mode,
                ctx.config.render_timeout,
                ctx.writer.staging_dir(),
                true,
            )
            .await?;
            let _ = page.close().await;
            let n = ctx.media_pages_since_recycle.fetch_add(1, Ordering::Relaxed) + 1;
            if n as u32 >= ctx.config.browser_recycle_pages {
                ctx.media_pages_since_recycle.store(0, Ordering::Relaxed);
            }
            (out.status, reqwest::header::HeaderMap::new(), out.raw_body_bytes.clone(), out.rendered_dom_html.clone(), Some(out))
        };
    let fetch_ended_at = Utc::now();

    if status == 403 || status == 503 {
        // Challenge detection for non-browser (raw) fetches has no DOM to
        // evaluate; browser-driven modes already resolved this inside
        // `renderer::render` (which returns `Err(ChallengeDetected)` itself
        // when unresolved, short-circuiting before we get here).
    }

    let extraction: ExtractionResult =
        extractors::extract_all(&dom_html, &headers, &page_url, ctx.config.mode, &ctx.normalizer_config);

    let raw_body_hash = hex_sha256(&body_bytes);
    let dom_hash = hex_sha256(dom_html.as_bytes());
    let url_digest = hex_sha256(entry.normalized_url.as_bytes());

    let media = render_out.as_ref().and_then(|out| out.media.as_ref()).map(|m| {
        let base = ctx.writer.staging_dir().join("media");
        write_media(&base, &entry.url_key, m)
    });

    let nav_end_reason = render_out
        .as_ref()
        .map(|out| out.nav_end_reason)
        .unwrap_or(crate::renderer::NavEndReason::Fetch);
    let timings = render_out.as_ref().map(|out| out.timings).unwrap_or_default();
    let final_url = render_out
        .as_ref()
        .map(|out| out.final_url.clone())
        .unwrap_or_else(|| entry.url.clone());

    let mut capabilities_used = vec!["page_facts".to_string(), "links".to_string(), "assets".to_string()];
    if extraction.seo.is_some() {
        capabilities_used.push("seo".to_string());
    }
    if extraction.metrics.is_some() {
        capabilities_used.push("metrics".to_string());
    }
    if media.is_some() {
        capabilities_used.push("media".to_string());
    }

    let page_record = PageRecord {
        normalized_url: entry.normalized_url.clone(),
        url_key: entry.url_key.clone(),
        status,
        raw_body_hash,
        dom_hash,
        url_digest,
        fetch_started_at,
        fetch_ended_at,
        final_url,
        depth: entry.depth,
        render_mode: ctx.config.mode,
        nav_end_reason,
        timings,
        body: dom_html,
        page_facts: extraction.page_facts,
        seo: extraction.seo,
        metrics: extraction.metrics,
        structured_data: extraction.structured_data,
        tech: extraction.tech,
        capabilities_used,
        media,
    };
    ctx.writer.write_page(&page_record)?;

    if let Some(accessibility) = extraction.accessibility {
        let record = AccessibilityRecordPersisted::new(entry.url_key.clone(), ctx.config.mode, accessibility);
        ctx.writer.write_accessibility(&record)?;
    }

    for asset in extraction.assets {
        let record = AssetRecordPersisted::from_extracted(entry.url_key.clone(), asset);
        ctx.writer.write_asset(&record)?;
    }

    let discovered = extraction.links.len();
    let mut enqueued = 0usize;
    let next_depth = entry.depth + 1;
    for link in extraction.links {
        let edge_record = EdgeRecord {
            source_url_key: link.source_url_key.clone(),
            source_url: entry.url.clone(),
            target_url: link.target_url.clone(),
            target_url_key: link.target_url_key.clone(),
            anchor_text: Some(link.anchor_text.clone()),
            rel: link.rel.clone(),
            is_external: link.is_external,
            dom_location_tag: link.dom_location,
            discovered_in_mode: ctx.config.mode,
        };
        ctx.writer.write_edge(&edge_record)?;

        if link.is_external || link.rejected_reason.is_some() {
            continue;
        }
        if !ctx.config.max_depth.allows(next_depth) {
            continue;
        }
        if link.target_url_key.is_none() {
            continue;
        }
        let target_key = UrlKey::from_canonical(&link.target_url);
        let discovered_entry = QueueEntry::discovered(
            link.target_url.clone(),
            link.target_url,
            target_key,
            next_depth,
            entry.url.clone(),
        );
        if ctx.scheduler.try_enqueue(discovered_entry, ctx.config.max_pages) {
            enqueued += 1;
        }
    }

    Ok(DispatchOutcome::Completed { discovered, enqueued })
}

fn write_media(base: &std::path::Path, url_key: &str, media: &crate::renderer::MediaCapture) -> MediaPaths {
    let desktop_dir = base.join("screenshots").join("desktop");
    let mobile_dir = base.join("screenshots").join("mobile");
    let favicon_dir = base.join("favicons");
    let _ = std::fs::create_dir_all(&desktop_dir);
    let _ = std::fs::create_dir_all(&mobile_dir);
    let _ = std::fs::create_dir_all(&favicon_dir);

    let desktop_path = desktop_dir.join(format!("{url_key}.jpg"));
    let mobile_path = mobile_dir.join(format!("{url_key}.jpg"));
    let _ = std::fs::write(&desktop_path, &media.screenshot_desktop_jpg);
    let _ = std::fs::write(&mobile_path, &media.screenshot_mobile_jpg);

    let favicon_path = media.favicon.as_ref().map(|bytes| {
        let path = favicon_dir.join(format!("{url_key}.ico"));
        let _ = std::fs::write(&path, bytes);
        rel_path(base, &path)
    });

    MediaPaths {
        screenshot_desktop_path: Some(rel_path(base, &desktop_path)),
        screenshot_mobile_path: Some(rel_path(base, &mobile_path)),
        favicon_path,
    }
}

fn rel_path(base: &std::path::Path, path: &std::path::Path) -> String {
    path.strip_prefix(base.parent().unwrap_or(base))
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn hex_sha256(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

async fn handle_page_outcome(_ctx: &Context, _outcome: PageOutcomeReport) {
    // Counters and events are already updated inside `process_entry`; this
    // hook exists so the dispatch loop has a single place to extend
    // per-completion bookkeeping (e.g. future per-depth metrics) without
    // touching the loop's control flow.
}

async fn heartbeat_loop(
    events: Arc<CrawlEventBus>,
    pages_crawled: Arc<AtomicU64>,
    scheduler: Arc<Scheduler>,
    started_at: chrono::DateTime<Utc>,
    cancel: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    while !cancel.load(Ordering::SeqCst) {
        ticker.tick().await;
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        let _ = events
            .publish(CrawlEvent::heartbeat(
                pages_crawled.load(Ordering::SeqCst),
                scheduler.queue_depth(),
                elapsed_ms,
            ))
            .await;
    }
}

async fn observability_loop(
    events: Arc<CrawlEventBus>,
    scheduler: Arc<Scheduler>,
    global_rps: f64,
    paused: Arc<AtomicBool>,
    rss_high_water_mb: u64,
    rss_low_water_mb: u64,
    cancel: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut system = sysinfo::System::new();
    let pid = sysinfo::Pid::from_u32(std::process::id());
    let mut backpressure_engaged = false;

    while !cancel.load(Ordering::SeqCst) {
        ticker.tick().await;
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        let rss_mb = system.process(pid).map(|p| p.memory() / (1024 * 1024)).unwrap_or(0);

        if !backpressure_engaged && rss_mb > rss_high_water_mb {
            backpressure_engaged = true;
            paused.store(true, Ordering::SeqCst);
            let _ = events
                .publish(CrawlEvent::backpressure(true, rss_mb, rss_high_water_mb, rss_low_water_mb))
                .await;
        } else if backpressure_engaged && rss_mb < rss_low_water_mb {
            backpressure_engaged = false;
            paused.store(false, Ordering::SeqCst);
            let _ = events
                .publish(CrawlEvent::backpressure(false, rss_mb, rss_high_water_mb, rss_low_water_mb))
                .await;
        }

        let per_host_in_flight = scheduler
            .per_host_in_flight()
            .into_iter()
            .collect::<std::collections::HashMap<_, _>>();
        let _ = events
            .publish(CrawlEvent::observability(
                scheduler.queue_depth(),
                scheduler.in_flight_count(),
                per_host_in_flight,
                Vec::new(),
                global_rps,
                rss_mb,
            ))
            .await;
    }
}

async fn write_checkpoint(ctx: &Context, staging_dir: &std::path::Path, crawl_id: &str) {
    let (queue, visited, in_flight) = ctx.scheduler.snapshot();
    let in_flight_snapshots: Vec<InFlightSnapshot> = in_flight
        .into_iter()
        .map(|(url_key, entry)| InFlightSnapshot {
            url: entry.url,
            url_key,
            depth: entry.depth,
            host: entry.host,
            discovered_from: entry.discovered_from,
        })
        .collect();

    let mut part_pointers = std::collections::BTreeMap::new();
    for (dataset, (path, offset)) in ctx.writer.part_pointers() {
        part_pointers.insert(
            dataset,
            PartPointer {
                part_file: path.to_string_lossy().to_string(),
                byte_offset: offset,
            },
        );
    }

    let host_buckets = ctx
        .limiter
        .host_token_snapshot()
        .into_iter()
        .map(|(host, tokens)| (host, HostBucketSnapshot { tokens }))
        .collect();

    let checkpoint = Checkpoint {
        crawl_id: crawl_id.to_string(),
        queue,
        visited,
        in_flight: in_flight_snapshots,
        part_pointers,
        host_buckets,
        counters: Counters {
            pages_crawled: ctx.pages_crawled.load(Ordering::SeqCst),
            errors_count: ctx.errors_count.load(Ordering::SeqCst),
            enqueued_count: ctx.scheduler.visited_count(),
        },
        timestamp: Utc::now(),
    };

    let _ = ctx.writer.flush_and_sync();
    if let Err(err) = checkpoint::write_atomic(staging_dir, &checkpoint) {
        tracing::warn!("checkpoint write failed: {err}");
        return;
    }
    let _ = ctx
        .events
        .publish(CrawlEvent::checkpoint(
            checkpoint.counters.pages_crawled,
            ctx.scheduler.queue_depth(),
            staging_dir.join("checkpoint.json"),
        ))
        .await;
}
