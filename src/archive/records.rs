//! Archive-level record shapes: the extractor/renderer outputs enriched with
//! the page context (url_key, render mode, audit metadata) they need before
//! they can be written to a dataset part. Extractors stay pure and
//! context-free (§4.6); this module is where that context gets attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractors::{
    AccessibilityRecord, AssetRecord, EnhancedMetrics, EnhancedSeo, PageFacts, StructuredDataEntry,
    TechSignature,
};
use crate::renderer::{NavEndReason, RenderMode, RenderTimings};

/// Paths of media captured for one page, relative to the archive root.
/// Present only when the page was rendered in `full` mode with media
/// capture enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPaths {
    pub screenshot_desktop_path: Option<String>,
    pub screenshot_mobile_path: Option<String>,
    pub favicon_path: Option<String>,
}

/// One completed page, as appended to `pages/part-NNN.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub normalized_url: String,
    pub url_key: String,
    pub status: u16,
    pub raw_body_hash: String,
    pub dom_hash: String,
    pub url_digest: String,
    pub fetch_started_at: DateTime<Utc>,
    pub fetch_ended_at: DateTime<Utc>,
    pub final_url: String,
    pub depth: u32,
    pub render_mode: RenderMode,
    pub nav_end_reason: NavEndReason,
    pub timings: RenderTimings,
    pub body: String,
    pub page_facts: PageFacts,
    pub seo: Option<EnhancedSeo>,
    pub metrics: Option<EnhancedMetrics>,
    pub structured_data: Vec<StructuredDataEntry>,
    pub tech: Vec<TechSignature>,
    pub capabilities_used: Vec<String>,
    pub media: Option<MediaPaths>,
}

/// One discovered link, as appended to `edges/part-NNN.jsonl`. Wraps
/// [`crate::extractors::EdgeRecord`] with the source page's own URL and the
/// mode it was discovered under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source_url_key: String,
    pub source_url: String,
    pub target_url: String,
    pub target_url_key: Option<String>,
    pub anchor_text: Option<String>,
    pub rel: crate::extractors::links::RelFlags,
    pub is_external: bool,
    pub dom_location_tag: crate::extractors::links::DomLocation,
    pub discovered_in_mode: RenderMode,
}

/// One asset reference, as appended to `assets/part-NNN.jsonl`. Wraps
/// [`crate::extractors::AssetRecord`] with the owning page's url_key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecordPersisted {
    pub parent_url_key: String,
    pub asset_url: String,
    pub media_type: String,
    pub size: Option<u64>,
}

impl AssetRecordPersisted {
    #[must_use]
    pub fn from_extracted(parent_url_key: String, asset: AssetRecord) -> Self {
        let media_type = match asset.kind {
            crate::extractors::assets::AssetKind::Image => "image",
            crate::extractors::assets::AssetKind::Video => "video",
            crate::extractors::assets::AssetKind::Audio => "audio",
            crate::extractors::assets::AssetKind::Source => "source",
            crate::extractors::assets::AssetKind::Script => "script",
            crate::extractors::assets::AssetKind::Stylesheet => "stylesheet",
        }
        .to_string();
        Self {
            parent_url_key,
            asset_url: asset.url,
            media_type,
            size: None,
        }
    }
}

/// Audit metadata attached to every accessibility record, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditProfile {
    Basic,
    Essential,
    Full,
}

impl AuditProfile {
    #[must_use]
    pub fn for_mode(mode: RenderMode) -> Self {
        match mode {
            RenderMode::Raw => Self::Basic,
            RenderMode::Prerender => Self::Essential,
            RenderMode::Full => Self::Full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEngine {
    pub name: String,
    pub version: String,
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self {
            name: "atlas-accessibility".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Wraps [`AccessibilityRecord`] with the audit metadata §3 requires. Only
/// written for pages rendered in `full` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityRecordPersisted {
    pub url_key: String,
    pub audit_engine: AuditEngine,
    pub wcag_version: String,
    pub audit_profile: AuditProfile,
    pub audited_at: DateTime<Utc>,
    #[serde(flatten)]
    pub findings: AccessibilityRecord,
}

impl AccessibilityRecordPersisted {
    #[must_use]
    pub fn new(url_key: String, mode: RenderMode, findings: AccessibilityRecord) -> Self {
        Self {
            url_key,
            audit_engine: AuditEngine::default(),
            wcag_version: "2.2".to_string(),
            audit_profile: AuditProfile::for_mode(mode),
            audited_at: Utc::now(),
            findings,
        }
    }
}

/// One dataset part's provenance, for re-verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub part_path: String,
    pub input_hash: String,
    pub produced_at: DateTime<Utc>,
    pub producer: String,
}
