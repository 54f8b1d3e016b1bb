//! The archive manifest and summary: the two top-level documents a reader
//! consults before touching any dataset part.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crawl_events::CompletionReason;
use crate::renderer::RenderMode;

pub const FORMAT_VERSION: &str = "1.0";

/// Per-dataset entry in the manifest's dataset table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifestEntry {
    pub name: String,
    pub part_count: u32,
    pub record_count: u64,
    pub byte_count: u64,
    pub schema_digest: String,
}

/// Integrity section: one SHA-256 per part file plus a single merkle-style
/// fingerprint over all of them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManifestIntegrity {
    pub files: BTreeMap<String, String>,
    pub merkle_audit_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManifestCapabilities {
    pub render_modes_used: Vec<RenderMode>,
    pub datasets_present: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsPolicyNote {
    pub respected: bool,
    pub note: Option<String>,
}

/// Single object at the archive root describing the whole crawl. Written
/// twice: once with `incomplete=true` at start of finalization, then
/// rewritten atomically with `incomplete=false` once every part is
/// compressed and hashed (§4.8 step 4-5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: String,
    pub created_at: DateTime<Utc>,
    pub owner: String,
    pub datasets: Vec<DatasetManifestEntry>,
    pub integrity: ManifestIntegrity,
    pub capabilities: ManifestCapabilities,
    pub robots_policy: RobotsPolicyNote,
    pub completion_reason: Option<CompletionReason>,
    pub notes: Vec<String>,
    pub incomplete: bool,
}

impl Manifest {
    /// An archive is readable only when this holds (P5).
    #[must_use]
    pub fn is_readable(&self) -> bool {
        !self.incomplete
    }
}

/// Aggregate stats consumable without scanning any dataset part.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total_pages: u64,
    pub total_edges: u64,
    pub total_assets: u64,
    pub total_errors: u64,
    pub status_code_histogram: BTreeMap<u16, u64>,
    pub render_mode_histogram: BTreeMap<String, u64>,
    pub max_depth_seen: u32,
    pub crawl_started_at: Option<DateTime<Utc>>,
    pub crawl_ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub completion_reason: Option<CompletionReason>,
}
