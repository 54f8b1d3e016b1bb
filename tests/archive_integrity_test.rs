//! End-to-end coverage for the archive writer's two-phase finalize: the
//! resulting `.atls` packages a manifest whose integrity hashes and merkle
//! root are independently reproducible, and whose `incomplete` flag is
//! false only once every part has been hashed (§8 P3, P5).

use std::io::Read;

use atlas_crawler::archive::{AccessibilityRecordPersisted, ArchiveWriter, EdgeRecord, Manifest, PageRecord, Summary};
use atlas_crawler::crawl_events::CompletionReason;
use atlas_crawler::extractors::accessibility::AccessibilityRecord;
use atlas_crawler::extractors::links::{DomLocation, RelFlags};
use atlas_crawler::extractors::page_facts::{HeadingOutline, PageFacts};
use atlas_crawler::renderer::{NavEndReason, RenderMode, RenderTimings};
use sha2::{Digest, Sha256};

fn sample_page_facts() -> PageFacts {
    PageFacts {
        title: Some("Example".to_string()),
        meta_description: None,
        headings: HeadingOutline::default(),
        canonical_raw: None,
        canonical_resolved: None,
        robots_meta: None,
        x_robots_tag: None,
        hreflang: Vec::new(),
        favicon_url: "https://example.com/favicon.ico".to_string(),
        link_count: 1,
        media_count: 0,
        images_missing_alt: 0,
    }
}

fn sample_page_record(url_key: &str, depth: u32) -> PageRecord {
    let now = chrono::Utc::now();
    PageRecord {
        normalized_url: "https://example.com/".to_string(),
        url_key: url_key.to_string(),
        status: 200,
        raw_body_hash: "deadbeef".to_string(),
        dom_hash: "deadbeef".to_string(),
        url_digest: "deadbeef".to_string(),
        fetch_started_at: now,
        fetch_ended_at: now,
        final_url: "https://example.com/".to_string(),
        depth,
        render_mode: RenderMode::Prerender,
        nav_end_reason: NavEndReason::Load,
        timings: RenderTimings::default(),
        body: "<html></html>".to_string(),
        page_facts: sample_page_facts(),
        seo: None,
        metrics: None,
        structured_data: Vec::new(),
        tech: Vec::new(),
        capabilities_used: Vec::new(),
        media: None,
    }
}

fn sample_edge(source_key: &str) -> EdgeRecord {
    EdgeRecord {
        source_url_key: source_key.to_string(),
        source_url: "https://example.com/".to_string(),
        target_url: "https://example.com/about".to_string(),
        target_url_key: Some("abc123".to_string()),
        anchor_text: Some("About".to_string()),
        rel: RelFlags::default(),
        is_external: false,
        dom_location_tag: DomLocation::Nav,
        discovered_in_mode: RenderMode::Prerender,
    }
}

#[test]
fn finalize_produces_a_readable_archive_with_verifiable_integrity() {
    let staging_parent = tempfile::tempdir().unwrap();
    let staging_dir = staging_parent.path().join("example.com_crawl");

    let writer = ArchiveWriter::open(&staging_dir).unwrap();
    for i in 0..3u32 {
        let key = format!("page-{i}");
        writer.write_page(&sample_page_record(&key, 0)).unwrap();
        writer.write_edge(&sample_edge(&key)).unwrap();
        writer
            .write_accessibility(&AccessibilityRecordPersisted::new(
                key.clone(),
                RenderMode::Prerender,
                AccessibilityRecord::default(),
            ))
            .unwrap();
    }
    writer.flush_and_sync().unwrap();

    let archive_path = writer
        .finalize(
            "atlas-crawl-test".to_string(),
            CompletionReason::Finished,
            vec![RenderMode::Prerender],
            true,
            None,
            chrono::Utc::now(),
            Vec::new(),
            |_summary: &mut Summary| {},
        )
        .unwrap();

    assert!(archive_path.exists());
    assert!(!staging_dir.exists(), "staging directory must be deleted after packaging");

    let file = std::fs::File::open(&archive_path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();

    let manifest: Manifest = {
        let mut entry = zip.by_name("manifest.json").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        serde_json::from_str(&contents).unwrap()
    };

    assert!(manifest.is_readable(), "finalized manifest must not be incomplete");
    assert_eq!(manifest.format_version, "1.0");
    assert_eq!(manifest.completion_reason, Some(CompletionReason::Finished));
    assert!(manifest.robots_policy.respected);

    let pages_dataset = manifest
        .datasets
        .iter()
        .find(|d| d.name == "pages")
        .expect("pages dataset entry present");
    assert_eq!(pages_dataset.record_count, 3);

    // Recompute each compressed part's SHA-256 directly from the zip and
    // confirm it matches what the manifest recorded.
    let mut recomputed_files: Vec<(String, String)> = Vec::new();
    for rel_path in manifest.integrity.files.keys() {
        let mut entry = zip.by_name(rel_path).unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        recomputed_files.push((rel_path.clone(), hex::encode(hasher.finalize())));
    }
    for (path, hash) in &recomputed_files {
        assert_eq!(manifest.integrity.files.get(path), Some(hash), "hash mismatch for {path}");
    }

    // The merkle root is the SHA-256 of the sorted-by-path concatenation of
    // every part's hash.
    let mut sorted = recomputed_files;
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut merkle_hasher = Sha256::new();
    for (_path, hash) in &sorted {
        merkle_hasher.update(hash.as_bytes());
    }
    let expected_merkle = hex::encode(merkle_hasher.finalize());
    assert_eq!(manifest.integrity.merkle_audit_hash, expected_merkle);

    let summary: Summary = {
        let mut entry = zip.by_name("summary.json").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        serde_json::from_str(&contents).unwrap()
    };
    assert_eq!(summary.total_pages, 3);
    assert_eq!(summary.completion_reason, Some(CompletionReason::Finished));
}

#[test]
fn empty_crawl_still_finalizes_to_a_readable_archive() {
    let staging_parent = tempfile::tempdir().unwrap();
    let staging_dir = staging_parent.path().join("empty_crawl");
    let writer = ArchiveWriter::open(&staging_dir).unwrap();

    let archive_path = writer
        .finalize(
            "atlas-crawl-test".to_string(),
            CompletionReason::Capped,
            vec![],
            false,
            Some("robots disabled by operator".to_string()),
            chrono::Utc::now(),
            vec!["no pages matched the seed filters".to_string()],
            |_summary: &mut Summary| {},
        )
        .unwrap();

    let file = std::fs::File::open(&archive_path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let manifest: Manifest = {
        let mut entry = zip.by_name("manifest.json").unwrap();
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        serde_json::from_str(&contents).unwrap()
    };
    assert!(manifest.is_readable());
    assert!(!manifest.robots_policy.respected);
    assert_eq!(manifest.notes, vec!["no pages matched the seed filters".to_string()]);
}
