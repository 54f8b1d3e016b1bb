//! Coverage for [`atlas_crawler::crawl_events::CrawlEventBus`]: publish/
//! subscribe delivery, pressure accounting, batch publishing, and graceful
//! shutdown — none of which had a dedicated test before.

use std::time::Duration;

use atlas_crawler::crawl_events::{CompletionReason, CrawlEvent, CrawlEventBus, ShutdownReason};

#[tokio::test]
async fn subscriber_receives_a_published_event() {
    let bus = CrawlEventBus::new(16);
    let mut rx = bus.subscribe();

    let published = bus
        .publish(CrawlEvent::heartbeat(3, 7, 1_000))
        .await
        .unwrap();
    assert_eq!(published, 1);

    let event = rx.recv().await.unwrap();
    match event {
        CrawlEvent::CrawlHeartbeat { pages_crawled, pages_queued, .. } => {
            assert_eq!(pages_crawled, 3);
            assert_eq!(pages_queued, 7);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn publish_with_no_subscribers_is_reported_as_dropped() {
    let bus = CrawlEventBus::new(16);
    let result = bus.publish(CrawlEvent::cache_hit("https://example.com".to_string())).await;
    assert!(result.is_err());
    assert_eq!(bus.metrics().snapshot().events_dropped, 0);
    assert_eq!(bus.metrics().snapshot().events_failed, 1);
}

#[tokio::test]
async fn pressure_tracks_buffered_events_relative_to_capacity() {
    let bus = CrawlEventBus::new(4);
    let _rx = bus.subscribe();
    assert_eq!(bus.pressure(), 0.0);

    for _ in 0..3 {
        bus.publish(CrawlEvent::cache_hit("https://example.com".to_string()))
            .await
            .unwrap();
    }
    assert!(bus.pressure() > 0.7);
    assert!(bus.is_overloaded());
}

#[tokio::test]
async fn publish_batch_reports_accurate_success_counts() {
    let bus = CrawlEventBus::new(16);
    let _rx = bus.subscribe();
    let events = vec![
        CrawlEvent::cache_hit("https://example.com/a".to_string()),
        CrawlEvent::cache_hit("https://example.com/b".to_string()),
        CrawlEvent::cache_hit("https://example.com/c".to_string()),
    ];
    let result = bus.publish_batch(events).await;
    assert_eq!(result.total, 3);
    assert_eq!(result.published, 3);
    assert!(result.is_complete());
    assert!(!result.has_failures());
}

#[tokio::test]
async fn shutdown_gracefully_wakes_waiters_and_sets_the_flag() {
    let bus = CrawlEventBus::new(16);
    let mut rx = bus.subscribe();
    assert!(!bus.is_shutdown());

    let waiter = {
        let bus = bus.clone();
        tokio::spawn(async move {
            tokio::time::timeout(Duration::from_secs(2), bus.wait_for_shutdown())
                .await
                .expect("shutdown notification should arrive")
        })
    };

    bus.shutdown_gracefully(ShutdownReason::CrawlCompleted).await;
    waiter.await.unwrap();
    assert!(bus.is_shutdown());

    let shutdown_event = rx.recv().await.unwrap();
    assert!(matches!(shutdown_event, CrawlEvent::Shutdown { .. }));
}

#[tokio::test]
async fn finished_event_round_trips_completion_reason() {
    let bus = CrawlEventBus::new(16);
    let mut rx = bus.subscribe();
    bus.publish(CrawlEvent::finished(42, 1, CompletionReason::Finished, Duration::from_secs(10)))
        .await
        .unwrap();
    match rx.recv().await.unwrap() {
        CrawlEvent::CrawlFinished { total_pages, reason, .. } => {
            assert_eq!(total_pages, 42);
            assert_eq!(reason, CompletionReason::Finished);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
