//! Durable crawl checkpoints: periodic snapshots of queue/visited/in-flight
//! state plus writer byte offsets, so a killed or gracefully stopped crawl
//! can resume without re-processing completed work or losing in-flight
//! entries (§4.9).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::scheduler::QueueEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartPointer {
    pub part_file: String,
    pub byte_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostBucketSnapshot {
    pub tokens: f64,
}

/// An in-flight entry at snapshot time. Treated as never-completed on
/// resume and re-enqueued at its original depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightSnapshot {
    pub url: String,
    pub url_key: String,
    pub depth: u32,
    pub host: String,
    pub discovered_from: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counters {
    pub pages_crawled: u64,
    pub errors_count: u64,
    pub enqueued_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub crawl_id: String,
    pub queue: Vec<QueueEntry>,
    pub visited: Vec<String>,
    pub in_flight: Vec<InFlightSnapshot>,
    pub part_pointers: BTreeMap<String, PartPointer>,
    pub host_buckets: BTreeMap<String, HostBucketSnapshot>,
    pub counters: Counters,
    pub timestamp: DateTime<Utc>,
}

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Write `checkpoint.json.tmp` then atomically rename to `checkpoint.json`.
pub fn write_atomic(staging_dir: &Path, checkpoint: &Checkpoint) -> Result<(), CrawlError> {
    let path = staging_dir.join(CHECKPOINT_FILE);
    let tmp_path = staging_dir.join(format!("{CHECKPOINT_FILE}.tmp"));
    let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| CrawlError::ValidationFailed {
        dataset: "checkpoint".to_string(),
        message: e.to_string(),
    })?;
    fs::write(&tmp_path, bytes).map_err(|e| CrawlError::WriteIo {
        path: tmp_path.clone(),
        source: e,
    })?;
    fs::rename(&tmp_path, &path).map_err(|e| CrawlError::WriteIo {
        path: path.clone(),
        source: e,
    })?;
    Ok(())
}

/// Load `checkpoint.json` from a staging directory left behind by a prior
/// run, for `--resume`.
pub fn load(staging_dir: &Path) -> Result<Checkpoint, CrawlError> {
    let path = staging_dir.join(CHECKPOINT_FILE);
    let bytes = fs::read(&path).map_err(|e| CrawlError::WriteIo {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CrawlError::ValidationFailed {
        dataset: "checkpoint".to_string(),
        message: e.to_string(),
    })
}

/// Truncate every recorded dataset part to its checkpointed byte offset,
/// discarding any partial line written after the snapshot but before a
/// crash. Called once, before resuming dispatch.
pub fn truncate_parts_to_checkpoint(checkpoint: &Checkpoint) -> Result<(), CrawlError> {
    for pointer in checkpoint.part_pointers.values() {
        let path = Path::new(&pointer.part_file);
        if !path.exists() {
            continue;
        }
        let file = fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| CrawlError::WriteIo {
                path: path.to_path_buf(),
                source: e,
            })?;
        file.set_len(pointer.byte_offset).map_err(|e| CrawlError::WriteIo {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Checkpoint {
        Checkpoint {
            crawl_id: "test-crawl".to_string(),
            queue: Vec::new(),
            visited: vec!["abc123".to_string()],
            in_flight: Vec::new(),
            part_pointers: BTreeMap::new(),
            host_buckets: BTreeMap::new(),
            counters: Counters::default(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn round_trips_through_atomic_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = sample();
        write_atomic(dir.path(), &checkpoint).unwrap();
        assert!(dir.path().join(CHECKPOINT_FILE).exists());
        assert!(!dir.path().join(format!("{CHECKPOINT_FILE}.tmp")).exists());
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.crawl_id, "test-crawl");
        assert_eq!(loaded.visited, vec!["abc123".to_string()]);
    }

    #[test]
    fn truncate_shrinks_part_past_recorded_offset() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("part-000.jsonl");
        fs::write(&part_path, b"{\"a\":1}\n{\"a\":2}\n").unwrap();
        let mut checkpoint = sample();
        checkpoint.part_pointers.insert(
            "pages".to_string(),
            PartPointer {
                part_file: part_path.to_string_lossy().to_string(),
                byte_offset: 8,
            },
        );
        truncate_parts_to_checkpoint(&checkpoint).unwrap();
        let contents = fs::read(&part_path).unwrap();
        assert_eq!(contents.len(), 8);
    }
}
