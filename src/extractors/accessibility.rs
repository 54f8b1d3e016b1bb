//! Accessibility extraction, tiered by render mode: static (all modes),
//! DOM (prerender+), runtime (full only).

use scraper::{Html, Selector};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AccessibilityRecord {
    pub images_missing_alt: usize,
    pub heading_sequence: Vec<u8>,
    pub landmarks_present: Vec<String>,
    pub role_histogram: HashMap<String, usize>,
    pub lang_attribute: Option<String>,
    pub unlabeled_form_controls: usize,

    // DOM tier (prerender+)
    pub tabindex_focus_order: Option<Vec<i32>>,
    pub aria_live_regions: Option<usize>,
    pub autocomplete_coverage_ratio: Option<f64>,

    // Runtime tier (full only)
    pub potential_keyboard_traps: Option<usize>,
    pub skip_links: Option<Vec<SkipLink>>,
    pub media_caption_coverage: Option<MediaCaptionCoverage>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SkipLink {
    pub href: String,
    pub target_exists: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MediaCaptionCoverage {
    pub media_elements: usize,
    pub with_captions: usize,
}

const PERSONAL_DATA_AUTOCOMPLETE_FIELDS: &[&str] =
    &["name", "email", "tel", "street-address", "postal-code", "cc-number"];

fn static_record(document: &Html) -> AccessibilityRecord {
    let images_missing_alt = document
        .select(&Selector::parse("img").unwrap())
        .filter(|e| e.value().attr("alt").is_none_or(str::is_empty))
        .count();

    let heading_sequence = (1..=6u8)
        .flat_map(|level| {
            let count = Selector::parse(&format!("h{level}"))
                .map(|s| document.select(&s).count())
                .unwrap_or(0);
            std::iter::repeat_n(level, count)
        })
        .collect();

    let landmark_tags = ["header", "nav", "main", "footer", "aside", "form"];
    let landmarks_present = landmark_tags
        .iter()
        .filter(|tag| {
            Selector::parse(tag)
                .map(|s| document.select(&s).next().is_some())
                .unwrap_or(false)
        })
        .map(|s| (*s).to_string())
        .collect();

    let mut role_histogram = HashMap::new();
    if let Ok(sel) = Selector::parse("[role]") {
        for el in document.select(&sel) {
            if let Some(role) = el.value().attr("role") {
                *role_histogram.entry(role.to_string()).or_insert(0) += 1;
            }
        }
    }

    let lang_attribute = Selector::parse("html")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(|el| el.value().attr("lang"))
        .map(str::to_string);

    let unlabeled_form_controls = count_unlabeled_controls(document);

    AccessibilityRecord {
        images_missing_alt,
        heading_sequence,
        landmarks_present,
        role_histogram,
        lang_attribute,
        unlabeled_form_controls,
        ..Default::default()
    }
}

fn count_unlabeled_controls(document: &Html) -> usize {
    let Ok(sel) = Selector::parse("input, select, textarea") else {
        return 0;
    };
    let labeled_ids: std::collections::HashSet<String> = Selector::parse("label[for]")
        .ok()
        .map(|label_sel| {
            document
                .select(&label_sel)
                .filter_map(|e| e.value().attr("for"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    document
        .select(&sel)
        .filter(|el| {
            let has_aria_label = el.value().attr("aria-label").is_some() || el.value().attr("aria-labelledby").is_some();
            let has_id_label = el.value().attr("id").is_some_and(|id| labeled_ids.contains(id));
            !has_aria_label && !has_id_label
        })
        .count()
}

pub fn extract_static(document: &Html) -> AccessibilityRecord {
    static_record(document)
}

pub fn extract_dom(document: &Html) -> AccessibilityRecord {
    let mut record = static_record(document);

    let tabindex_focus_order = Selector::parse("[tabindex]").ok().map(|sel| {
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("tabindex")?.parse::<i32>().ok())
            .collect()
    });
    let aria_live_regions = Selector::parse("[aria-live]")
        .ok()
        .map(|sel| document.select(&sel).count());

    let personal_inputs = Selector::parse("input[autocomplete], input[name], input[type=email], input[type=tel]")
        .ok()
        .map(|sel| document.select(&sel).collect::<Vec<_>>())
        .unwrap_or_default();
    let autocomplete_coverage_ratio = if personal_inputs.is_empty() {
        Some(1.0)
    } else {
        let covered = personal_inputs
            .iter()
            .filter(|el| {
                el.value()
                    .attr("autocomplete")
                    .is_some_and(|v| PERSONAL_DATA_AUTOCOMPLETE_FIELDS.iter().any(|f| v.contains(f)))
            })
            .count();
        Some(covered as f64 / personal_inputs.len() as f64)
    };

    record.tabindex_focus_order = tabindex_focus_order;
    record.aria_live_regions = aria_live_regions;
    record.autocomplete_coverage_ratio = autocomplete_coverage_ratio;
    record
}

pub fn extract_runtime(document: &Html) -> AccessibilityRecord {
    let mut record = extract_dom(document);

    // Heuristic only: negative tabindex on an otherwise-interactive element
    // without an explicit re-entry path is flagged, not proven, as a trap.
    let potential_keyboard_traps = Selector::parse("[tabindex='-1']")
        .ok()
        .map(|sel| {
            document
                .select(&sel)
                .filter(|el| matches!(el.value().name(), "div" | "span" | "button" | "a"))
                .count()
        });

    let skip_links = Selector::parse("a[href^='#']").ok().map(|sel| {
        document
            .select(&sel)
            .filter_map(|el| {
                let href = el.value().attr("href")?;
                let text = el.text().collect::<String>().to_ascii_lowercase();
                if !text.contains("skip") {
                    return None;
                }
                let id = href.trim_start_matches('#');
                let target_exists = Selector::parse(&format!("#{id}"))
                    .ok()
                    .is_some_and(|s| document.select(&s).next().is_some());
                Some(SkipLink {
                    href: href.to_string(),
                    target_exists,
                })
            })
            .collect()
    });

    let media_caption_coverage = Selector::parse("video, audio").ok().map(|sel| {
        let elements: Vec<_> = document.select(&sel).collect();
        let media_elements = elements.len();
        let with_captions = elements
            .iter()
            .filter(|el| {
                el.select(&Selector::parse("track[kind=captions], track[kind=subtitles], track[kind=descriptions]").unwrap())
                    .next()
                    .is_some()
            })
            .count();
        MediaCaptionCoverage {
            media_elements,
            with_captions,
        }
    });

    record.potential_keyboard_traps = potential_keyboard_traps;
    record.skip_links = skip_links;
    record.media_caption_coverage = media_caption_coverage;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_tier_counts_missing_alt_and_landmarks() {
        let html = r#"<html lang="en"><body><nav></nav><img src="a.png"></body></html>"#;
        let doc = Html::parse_document(html);
        let record = extract_static(&doc);
        assert_eq!(record.images_missing_alt, 1);
        assert!(record.landmarks_present.contains(&"nav".to_string()));
        assert_eq!(record.lang_attribute.as_deref(), Some("en"));
    }

    #[test]
    fn runtime_tier_flags_skip_link_with_missing_target() {
        let html = r#"<html><body><a href="#main">Skip to content</a></body></html>"#;
        let doc = Html::parse_document(html);
        let record = extract_runtime(&doc);
        let links = record.skip_links.unwrap();
        assert_eq!(links.len(), 1);
        assert!(!links[0].target_exists);
    }

    #[test]
    fn runtime_tier_reports_media_caption_coverage() {
        let html = r#"<html><body><video><track kind="captions"></video><video></video></body></html>"#;
        let doc = Html::parse_document(html);
        let record = extract_runtime(&doc);
        let coverage = record.media_caption_coverage.unwrap();
        assert_eq!(coverage.media_elements, 2);
        assert_eq!(coverage.with_captions, 1);
    }
}
