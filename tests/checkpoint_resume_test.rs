//! Resume round-trip: a scheduler snapshot survives a checkpoint write/load
//! cycle and part truncation discards only bytes written after the
//! snapshot, with in-flight entries re-enqueued rather than lost (§4.9, P9).

use std::collections::BTreeMap;
use std::fs;

use atlas_crawler::checkpoint::{self, Checkpoint, Counters, InFlightSnapshot, PartPointer};
use atlas_crawler::normalizer::UrlKey;
use atlas_crawler::scheduler::{DequeueOutcome, QueueEntry, Scheduler};

fn entry(url: &str, depth: u32) -> QueueEntry {
    let key = UrlKey::from_canonical(url);
    QueueEntry {
        depth,
        ..QueueEntry::seed(url.to_string(), url.to_string(), key)
    }
}

#[test]
fn checkpoint_round_trip_preserves_exactly_once_semantics_and_requeues_in_flight() {
    let scheduler = Scheduler::new();
    scheduler.seed(vec![entry("https://a.example/", 0)]);
    assert!(scheduler.try_enqueue(entry("https://b.example/", 1), 0));
    assert!(scheduler.try_enqueue(entry("https://c.example/", 1), 0));

    // Dispatch "a" (visited, in-flight) but never complete it -- simulating
    // a crash mid-fetch.
    let dispatched = match scheduler.dequeue().unwrap() {
        DequeueOutcome::Dispatch(e) => e,
        DequeueOutcome::AlreadyVisited => panic!("unexpected"),
    };
    scheduler.mark_dispatched(&dispatched, "a.example".to_string());

    let (queue, visited, in_flight) = scheduler.snapshot();
    assert_eq!(visited, vec![dispatched.url_key.clone()]);
    assert_eq!(queue.len(), 2);
    assert_eq!(in_flight.len(), 1);

    let in_flight_snapshots: Vec<InFlightSnapshot> = in_flight
        .iter()
        .map(|(key, e)| InFlightSnapshot {
            url: e.url.clone(),
            url_key: key.clone(),
            depth: e.depth,
            host: e.host.clone(),
            discovered_from: e.discovered_from.clone(),
        })
        .collect();

    let dir = tempfile::tempdir().unwrap();
    let checkpoint = Checkpoint {
        crawl_id: "crawl-1".to_string(),
        queue: queue.clone(),
        visited: visited.clone(),
        in_flight: in_flight_snapshots,
        part_pointers: BTreeMap::new(),
        host_buckets: BTreeMap::new(),
        counters: Counters {
            pages_crawled: 0,
            errors_count: 0,
            enqueued_count: 3,
        },
        timestamp: chrono::Utc::now(),
    };
    checkpoint::write_atomic(dir.path(), &checkpoint).unwrap();

    let loaded = checkpoint::load(dir.path()).unwrap();
    assert_eq!(loaded.crawl_id, "crawl-1");
    assert_eq!(loaded.queue.len(), 2);
    assert_eq!(loaded.in_flight.len(), 1);

    // Rebuild a fresh scheduler the way `--resume` does: in-flight entries
    // are treated as never-completed and re-enqueued at their original depth.
    let resumed = Scheduler::new();
    let in_flight_reentries: Vec<QueueEntry> = loaded
        .in_flight
        .iter()
        .map(|snap| QueueEntry {
            url: snap.url.clone(),
            normalized_url: snap.url.clone(),
            url_key: snap.url_key.clone(),
            depth: snap.depth,
            discovered_from: snap.discovered_from.clone(),
            discovered_at: chrono::Utc::now(),
        })
        .collect();
    resumed.restore(loaded.queue.clone(), loaded.visited.clone(), in_flight_reentries);

    // The in-flight "a" is no longer visited and sits back in the queue: it
    // will be dispatched exactly once more, not dropped, not duplicated.
    assert_eq!(resumed.visited_count(), 0);
    assert_eq!(resumed.queue_depth(), 3);

    let mut dequeued_urls = Vec::new();
    while let Some(outcome) = resumed.dequeue() {
        match outcome {
            DequeueOutcome::Dispatch(e) => dequeued_urls.push(e.url),
            DequeueOutcome::AlreadyVisited => continue,
        }
    }
    dequeued_urls.sort();
    assert_eq!(
        dequeued_urls,
        vec![
            "https://a.example/".to_string(),
            "https://b.example/".to_string(),
            "https://c.example/".to_string(),
        ]
    );
}

#[test]
fn truncate_parts_discards_only_bytes_past_the_checkpointed_offset() {
    let staging = tempfile::tempdir().unwrap();
    let pages_dir = staging.path().join("pages");
    fs::create_dir_all(&pages_dir).unwrap();
    let part_path = pages_dir.join("part-000.jsonl");
    fs::write(&part_path, b"{\"url_key\":\"a\"}\n{\"url_key\":\"b\"}\n{\"url_key\":\"c\"}\n").unwrap();
    let offset_after_two_records = b"{\"url_key\":\"a\"}\n{\"url_key\":\"b\"}\n".len() as u64;

    let mut part_pointers = BTreeMap::new();
    part_pointers.insert(
        "pages".to_string(),
        PartPointer {
            part_file: part_path.to_string_lossy().to_string(),
            byte_offset: offset_after_two_records,
        },
    );
    let checkpoint = Checkpoint {
        crawl_id: "crawl-2".to_string(),
        queue: Vec::new(),
        visited: Vec::new(),
        in_flight: Vec::new(),
        part_pointers,
        host_buckets: BTreeMap::new(),
        counters: Counters::default(),
        timestamp: chrono::Utc::now(),
    };

    checkpoint::truncate_parts_to_checkpoint(&checkpoint).unwrap();

    let contents = fs::read_to_string(&part_path).unwrap();
    assert_eq!(contents, "{\"url_key\":\"a\"}\n{\"url_key\":\"b\"}\n");
}
