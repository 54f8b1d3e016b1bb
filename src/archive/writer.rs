//! Streaming, content-addressed archive writer.
//!
//! Datasets are appended to as newline-delimited JSON while the crawl runs;
//! compression, hashing, and manifest assembly only happen once, at
//! finalize. Grounded on the crash-safety shape described in §4.8: the
//! staging directory is either a recoverable partial state (prior
//! checkpoint + append-only parts) or, after finalize, a packaged archive.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crawl_events::CompletionReason;
use crate::error::CrawlError;
use crate::renderer::RenderMode;

use super::manifest::{
    DatasetManifestEntry, Manifest, ManifestCapabilities, ManifestIntegrity, RobotsPolicyNote,
    Summary, FORMAT_VERSION,
};
use super::records::{
    AccessibilityRecordPersisted, AssetRecordPersisted, EdgeRecord, PageRecord, ProvenanceRecord,
};

const PART_ROLL_BYTES: u64 = 150 * 1024 * 1024;
const FLUSH_EVERY_RECORDS: u64 = 1000;

const DATASET_NAMES: &[&str] = &["pages", "edges", "assets", "errors", "accessibility"];

fn schema_stub(dataset: &str) -> String {
    format!(
        "{{\n  \"$schema\": \"https://json-schema.org/draft/2020-12/schema\",\n  \"title\": \"{dataset}.v1\",\n  \"type\": \"object\"\n}}\n"
    )
}

struct DatasetWriter {
    dataset: &'static str,
    dir: PathBuf,
    current: BufWriter<File>,
    current_path: PathBuf,
    part_index: u32,
    bytes_in_part: u64,
    finished_parts: Vec<PathBuf>,
    record_count: u64,
}

impl DatasetWriter {
    fn open(staging_dir: &Path, dataset: &'static str) -> std::io::Result<Self> {
        let dir = staging_dir.join(dataset);
        fs::create_dir_all(&dir)?;
        let current_path = dir.join("part-000.jsonl");
        let current = BufWriter::new(OpenOptions::new().create(true).append(true).open(&current_path)?);
        Ok(Self {
            dataset,
            dir,
            current,
            current_path,
            part_index: 0,
            bytes_in_part: 0,
            finished_parts: Vec::new(),
            record_count: 0,
        })
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.current.write_all(line)?;
        self.current.write_all(b"\n")?;
        self.bytes_in_part += line.len() as u64 + 1;
        self.record_count += 1;
        if self.bytes_in_part >= PART_ROLL_BYTES {
            self.roll()?;
        }
        Ok(())
    }

    fn roll(&mut self) -> std::io::Result<()> {
        self.current.flush()?;
        self.finished_parts.push(self.current_path.clone());
        self.part_index += 1;
        self.current_path = self.dir.join(format!("part-{:03}.jsonl", self.part_index));
        self.bytes_in_part = 0;
        self.current = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.current_path)?,
        );
        Ok(())
    }

    fn flush_and_sync(&mut self) -> std::io::Result<()> {
        self.current.flush()?;
        self.current.get_ref().sync_all()
    }

    /// `(current part path, byte offset)`, for checkpoint snapshots.
    fn byte_offset(&self) -> (PathBuf, u64) {
        (self.current_path.clone(), self.bytes_in_part)
    }

    fn all_parts(&self) -> Vec<PathBuf> {
        let mut parts = self.finished_parts.clone();
        if self.bytes_in_part > 0 || parts.is_empty() {
            parts.push(self.current_path.clone());
        }
        parts
    }

    fn finish(mut self) -> std::io::Result<Vec<PathBuf>> {
        self.current.flush()?;
        let parts = self.all_parts();
        Ok(parts)
    }
}

/// Streaming writer for one crawl's staging directory. One [`DatasetWriter`]
/// per dataset, each serialized behind its own mutex (single-writer per
/// dataset, per §5's shared-resource policy — an ordinary mutex rather than
/// a channel+task, since appends are short and never held across an await).
pub struct ArchiveWriter {
    staging_dir: PathBuf,
    pages: Mutex<DatasetWriter>,
    edges: Mutex<DatasetWriter>,
    assets: Mutex<DatasetWriter>,
    errors: Mutex<DatasetWriter>,
    accessibility: Mutex<DatasetWriter>,
    records_since_flush: AtomicU64,
    status_histogram: Mutex<BTreeMap<u16, u64>>,
    mode_histogram: Mutex<BTreeMap<String, u64>>,
    max_depth_seen: AtomicU64,
}

impl ArchiveWriter {
    pub fn open(staging_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let staging_dir = staging_dir.into();
        fs::create_dir_all(&staging_dir)?;
        Ok(Self {
            pages: Mutex::new(DatasetWriter::open(&staging_dir, "pages")?),
            edges: Mutex::new(DatasetWriter::open(&staging_dir, "edges")?),
            assets: Mutex::new(DatasetWriter::open(&staging_dir, "assets")?),
            errors: Mutex::new(DatasetWriter::open(&staging_dir, "errors")?),
            accessibility: Mutex::new(DatasetWriter::open(&staging_dir, "accessibility")?),
            staging_dir,
            records_since_flush: AtomicU64::new(0),
            status_histogram: Mutex::new(BTreeMap::new()),
            mode_histogram: Mutex::new(BTreeMap::new()),
            max_depth_seen: AtomicU64::new(0),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn append(
        &self,
        writer: &Mutex<DatasetWriter>,
        record: &impl Serialize,
    ) -> Result<(), CrawlError> {
        let line = serde_json::to_vec(record).map_err(|e| CrawlError::ValidationFailed {
            dataset: "unknown".to_string(),
            message: e.to_string(),
        })?;
        writer
            .lock()
            .unwrap()
            .write_line(&line)
            .map_err(|e| CrawlError::WriteIo {
                path: self.staging_dir.clone(),
                source: e,
            })?;
        self.maybe_flush();
        Ok(())
    }

    fn maybe_flush(&self) {
        let n = self.records_since_flush.fetch_add(1, Ordering::Relaxed) + 1;
        if n % FLUSH_EVERY_RECORDS == 0 {
            let _ = self.flush_and_sync();
        }
    }

    pub fn write_page(&self, record: &PageRecord) -> Result<(), CrawlError> {
        *self
            .status_histogram
            .lock()
            .unwrap()
            .entry(record.status)
            .or_insert(0) += 1;
        *self
            .mode_histogram
            .lock()
            .unwrap()
            .entry(render_mode_label(record.render_mode).to_string())
            .or_insert(0) += 1;
        self.max_depth_seen.fetch_max(record.depth as u64, Ordering::Relaxed);
        self.append(&self.pages, record)
    }

    pub fn write_edge(&self, record: &EdgeRecord) -> Result<(), CrawlError> {
        self.append(&self.edges, record)
    }

    pub fn write_asset(&self, record: &AssetRecordPersisted) -> Result<(), CrawlError> {
        self.append(&self.assets, record)
    }

    pub fn write_error(&self, record: &crate::error::ErrorRecord) -> Result<(), CrawlError> {
        self.append(&self.errors, record)
    }

    pub fn write_accessibility(&self, record: &AccessibilityRecordPersisted) -> Result<(), CrawlError> {
        self.append(&self.accessibility, record)
    }

    /// Flush and fsync every open stream. Called on the periodic cadence and
    /// unconditionally before a checkpoint snapshot.
    pub fn flush_and_sync(&self) -> Result<(), CrawlError> {
        for writer in [&self.pages, &self.edges, &self.assets, &self.errors, &self.accessibility] {
            writer
                .lock()
                .unwrap()
                .flush_and_sync()
                .map_err(|e| CrawlError::WriteIo {
                    path: self.staging_dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Byte offsets of every dataset's currently-open part, for checkpoint
    /// snapshots (§4.9).
    pub fn part_pointers(&self) -> BTreeMap<String, (PathBuf, u64)> {
        let mut pointers = BTreeMap::new();
        pointers.insert("pages".to_string(), self.pages.lock().unwrap().byte_offset());
        pointers.insert("edges".to_string(), self.edges.lock().unwrap().byte_offset());
        pointers.insert("assets".to_string(), self.assets.lock().unwrap().byte_offset());
        pointers.insert("errors".to_string(), self.errors.lock().unwrap().byte_offset());
        pointers.insert(
            "accessibility".to_string(),
            self.accessibility.lock().unwrap().byte_offset(),
        );
        pointers
    }

    pub fn record_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        counts.insert("pages".to_string(), self.pages.lock().unwrap().record_count);
        counts.insert("edges".to_string(), self.edges.lock().unwrap().record_count);
        counts.insert("assets".to_string(), self.assets.lock().unwrap().record_count);
        counts.insert("errors".to_string(), self.errors.lock().unwrap().record_count);
        counts.insert(
            "accessibility".to_string(),
            self.accessibility.lock().unwrap().record_count,
        );
        counts
    }

    pub fn summary_snapshot(&self) -> (BTreeMap<u16, u64>, BTreeMap<String, u64>, u32) {
        (
            self.status_histogram.lock().unwrap().clone(),
            self.mode_histogram.lock().unwrap().clone(),
            self.max_depth_seen.load(Ordering::Relaxed) as u32,
        )
    }

    /// Two-phase finalization (§4.8): compress, hash, write manifest
    /// incomplete then complete, package, delete staging.
    pub fn finalize(
        self,
        owner: String,
        completion_reason: CompletionReason,
        render_modes_used: Vec<RenderMode>,
        respect_robots: bool,
        robots_note: Option<String>,
        crawl_started_at: chrono::DateTime<Utc>,
        notes: Vec<String>,
        summary_extra: impl FnOnce(&mut Summary),
    ) -> Result<PathBuf, CrawlError> {
        let staging_dir = self.staging_dir.clone();
        let (status_histogram, mode_histogram, max_depth_seen) = self.summary_snapshot();

        let mut dataset_parts: BTreeMap<&'static str, Vec<PathBuf>> = BTreeMap::new();
        dataset_parts.insert("pages", self.pages.into_inner().unwrap().finish().map_io(&staging_dir)?);
        dataset_parts.insert("edges", self.edges.into_inner().unwrap().finish().map_io(&staging_dir)?);
        dataset_parts.insert("assets", self.assets.into_inner().unwrap().finish().map_io(&staging_dir)?);
        dataset_parts.insert("errors", self.errors.into_inner().unwrap().finish().map_io(&staging_dir)?);
        dataset_parts.insert(
            "accessibility",
            self.accessibility.into_inner().unwrap().finish().map_io(&staging_dir)?,
        );

        // Step 2: compress every part with zstd, delete the uncompressed original.
        let mut compressed_parts: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut record_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut byte_counts: BTreeMap<String, u64> = BTreeMap::new();
        for (dataset, parts) in &dataset_parts {
            for part in parts {
                if part.exists() {
                    let (count, bytes) = compress_and_count(part)?;
                    let compressed = part.with_extension("jsonl.zst");
                    let rel = compressed
                        .strip_prefix(&staging_dir)
                        .unwrap_or(&compressed)
                        .to_string_lossy()
                        .to_string();
                    compressed_parts.insert(rel, compressed);
                    *record_counts.entry((*dataset).to_string()).or_insert(0) += count;
                    *byte_counts.entry((*dataset).to_string()).or_insert(0) += bytes;
                }
            }
        }

        // Step 3: schema copies + summary.json.
        let schemas_dir = staging_dir.join("schemas");
        fs::create_dir_all(&schemas_dir).map_err(|e| CrawlError::WriteIo {
            path: schemas_dir.clone(),
            source: e,
        })?;
        let mut schema_digests = BTreeMap::new();
        for dataset in DATASET_NAMES {
            let content = schema_stub(dataset);
            let path = schemas_dir.join(format!("{dataset}.schema.json"));
            fs::write(&path, &content).map_err(|e| CrawlError::WriteIo {
                path: path.clone(),
                source: e,
            })?;
            schema_digests.insert((*dataset).to_string(), hex_sha256(content.as_bytes()));
        }

        let mut summary = Summary {
            total_pages: *record_counts.get("pages").unwrap_or(&0),
            total_edges: *record_counts.get("edges").unwrap_or(&0),
            total_assets: *record_counts.get("assets").unwrap_or(&0),
            total_errors: *record_counts.get("errors").unwrap_or(&0),
            status_code_histogram: status_histogram,
            render_mode_histogram: mode_histogram,
            max_depth_seen,
            crawl_started_at: Some(crawl_started_at),
            crawl_ended_at: Some(Utc::now()),
            duration_ms: (Utc::now() - crawl_started_at).num_milliseconds().max(0) as u64,
            completion_reason: Some(completion_reason),
        };
        summary_extra(&mut summary);
        let summary_path = staging_dir.join("summary.json");
        fs::write(&summary_path, serde_json::to_vec_pretty(&summary).unwrap()).map_err(|e| CrawlError::WriteIo {
            path: summary_path.clone(),
            source: e,
        })?;

        // Step 4/5: integrity hashes + two-phase manifest.
        let mut files = BTreeMap::new();
        for (rel, path) in &compressed_parts {
            let bytes = fs::read(path).map_err(|e| CrawlError::WriteIo {
                path: path.clone(),
                source: e,
            })?;
            files.insert(rel.clone(), hex_sha256(&bytes));
        }
        let merkle_audit_hash = merkle_root(&files);

        let datasets: Vec<DatasetManifestEntry> = DATASET_NAMES
            .iter()
            .map(|name| DatasetManifestEntry {
                name: (*name).to_string(),
                part_count: dataset_parts.get(*name).map(Vec::len).unwrap_or(0) as u32,
                record_count: *record_counts.get(*name).unwrap_or(&0),
                byte_count: *byte_counts.get(*name).unwrap_or(&0),
                schema_digest: schema_digests.get(*name).cloned().unwrap_or_default(),
            })
            .collect();

        let manifest_path = staging_dir.join("manifest.json");
        let mut manifest = Manifest {
            format_version: FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            owner,
            datasets,
            integrity: ManifestIntegrity {
                files,
                merkle_audit_hash,
            },
            capabilities: ManifestCapabilities {
                render_modes_used,
                datasets_present: DATASET_NAMES.iter().map(|s| (*s).to_string()).collect(),
            },
            robots_policy: RobotsPolicyNote {
                respected: respect_robots,
                note: robots_note,
            },
            completion_reason: Some(completion_reason),
            notes,
            incomplete: true,
        };
        write_manifest_atomic(&manifest_path, &manifest)?;
        manifest.incomplete = false;
        write_manifest_atomic(&manifest_path, &manifest)?;

        // Step 6/7: package the staging directory, then delete it.
        let archive_path = staging_dir.with_extension("atls");
        package_archive(&staging_dir, &archive_path)?;
        fs::remove_dir_all(&staging_dir).map_err(|e| CrawlError::WriteIo {
            path: staging_dir.clone(),
            source: e,
        })?;

        Ok(archive_path)
    }
}

fn render_mode_label(mode: RenderMode) -> &'static str {
    match mode {
        RenderMode::Raw => "raw",
        RenderMode::Prerender => "prerender",
        RenderMode::Full => "full",
    }
}

trait MapIo<T> {
    fn map_io(self, staging_dir: &Path) -> Result<T, CrawlError>;
}

impl MapIo<Vec<PathBuf>> for std::io::Result<Vec<PathBuf>> {
    fn map_io(self, staging_dir: &Path) -> Result<Vec<PathBuf>, CrawlError> {
        self.map_err(|e| CrawlError::WriteIo {
            path: staging_dir.to_path_buf(),
            source: e,
        })
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA-256 of the concatenation of part hashes, sorted by path (P3).
fn merkle_root(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (_path, hash) in files {
        hasher.update(hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn compress_and_count(part: &Path) -> Result<(u64, u64), CrawlError> {
    let raw = fs::read(part).map_err(|e| CrawlError::WriteIo {
        path: part.to_path_buf(),
        source: e,
    })?;
    let record_count = raw.iter().filter(|&&b| b == b'\n').count() as u64;
    let compressed = zstd::encode_all(raw.as_slice(), 0).map_err(|e| CrawlError::WriteIo {
        path: part.to_path_buf(),
        source: e,
    })?;
    let byte_len = compressed.len() as u64;
    let compressed_path = part.with_extension("jsonl.zst");
    fs::write(&compressed_path, compressed).map_err(|e| CrawlError::WriteIo {
        path: compressed_path.clone(),
        source: e,
    })?;
    fs::remove_file(part).map_err(|e| CrawlError::WriteIo {
        path: part.to_path_buf(),
        source: e,
    })?;
    Ok((record_count, byte_len))
}

fn write_manifest_atomic(path: &Path, manifest: &Manifest) -> Result<(), CrawlError> {
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| CrawlError::ValidationFailed {
        dataset: "manifest".to_string(),
        message: e.to_string(),
    })?;
    fs::write(&tmp_path, bytes).map_err(|e| CrawlError::WriteIo {
        path: tmp_path.clone(),
        source: e,
    })?;
    fs::rename(&tmp_path, path).map_err(|e| CrawlError::WriteIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Package the staging directory into a single ZIP container. Every entry
/// is stored with no extra compression, since dataset parts are already
/// zstd-compressed and re-deflating them would only cost CPU.
fn package_archive(staging_dir: &Path, archive_path: &Path) -> Result<(), CrawlError> {
    let file = File::create(archive_path).map_err(|e| CrawlError::WriteIo {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for entry in walk(staging_dir) {
        let rel = entry.strip_prefix(staging_dir).unwrap();
        if entry.is_dir() {
            zip.add_directory(rel.to_string_lossy(), options)
        } else {
            let bytes = fs::read(&entry).map_err(|e| CrawlError::WriteIo {
                path: entry.clone(),
                source: e,
            })?;
            zip.start_file(rel.to_string_lossy(), options)
                .and_then(|()| zip.write_all(&bytes))
        }
        .map_err(|e| CrawlError::WriteIo {
            path: entry.clone(),
            source: std::io::Error::other(e),
        })?;
    }
    zip.finish().map_err(|e| CrawlError::WriteIo {
        path: archive_path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    Ok(())
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(std::fs::DirEntry::path);
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}

/// A single dataset part's provenance record, for the optional
/// `provenance.v1.jsonl` stream.
pub fn provenance_for(part_path: &str, input_hash: &str, producer: &str) -> ProvenanceRecord {
    ProvenanceRecord {
        part_path: part_path.to_string(),
        input_hash: input_hash.to_string(),
        produced_at: Utc::now(),
        producer: producer.to_string(),
    }
}
