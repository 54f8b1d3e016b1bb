//! Link extraction: `<a[href]>` resolution, DOM-location tagging, rel flags.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::normalizer::{self, NormalizerConfig, UrlKey};

/// Ancestor-landmark classification of where a link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomLocation {
    Nav,
    Header,
    Footer,
    Aside,
    Main,
    Other,
    Unknown,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RelFlags {
    pub nofollow: bool,
    pub sponsored: bool,
    pub ugc: bool,
}

/// One discovered link, per `(source_url_key, target_url, dom_location)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EdgeRecord {
    pub source_url_key: String,
    pub target_url: String,
    pub target_url_key: Option<String>,
    pub is_external: bool,
    pub dom_location: DomLocation,
    pub rel: RelFlags,
    pub anchor_text: String,
    pub rejected_reason: Option<String>,
}

pub fn extract(document: &Html, page_url: &Url, config: &NormalizerConfig) -> Vec<EdgeRecord> {
    let selector = Selector::parse("a[href]").expect("static selector is valid");
    let source_key = UrlKey::from_canonical(page_url.as_str()).to_hex();

    let mut seen = std::collections::HashSet::new();
    let mut edges = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let location = classify_location(element);
        let rel = parse_rel(element.value().attr("rel").unwrap_or_default());
        let anchor_text = element.text().collect::<String>().trim().to_string();

        let dedup_key = (href.to_string(), location);
        if !seen.insert(dedup_key) {
            continue;
        }

        match normalizer::normalize(href, page_url, config) {
            Ok(outcome) => edges.push(EdgeRecord {
                source_url_key: source_key.clone(),
                target_url: outcome.normalized_url.as_str().to_string(),
                target_url_key: Some(outcome.url_key.to_hex()),
                is_external: outcome.is_external,
                dom_location: location,
                rel,
                anchor_text,
                rejected_reason: None,
            }),
            Err(reason) => edges.push(EdgeRecord {
                source_url_key: source_key.clone(),
                target_url: href.to_string(),
                target_url_key: None,
                is_external: false,
                dom_location: location,
                rel,
                anchor_text,
                rejected_reason: Some(format!("{reason:?}")),
            }),
        }
    }

    edges
}

fn parse_rel(rel: &str) -> RelFlags {
    let tokens: std::collections::HashSet<&str> = rel.split_ascii_whitespace().collect();
    RelFlags {
        nofollow: tokens.contains("nofollow"),
        sponsored: tokens.contains("sponsored"),
        ugc: tokens.contains("ugc"),
    }
}

fn classify_location(element: ElementRef) -> DomLocation {
    for ancestor in element.ancestors() {
        let Some(el) = scraper::ElementRef::wrap(ancestor) else {
            continue;
        };
        match el.value().name() {
            "nav" => return DomLocation::Nav,
            "header" => return DomLocation::Header,
            "footer" => return DomLocation::Footer,
            "aside" => return DomLocation::Aside,
            "main" => return DomLocation::Main,
            _ => {}
        }
    }
    DomLocation::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_nav_links_as_nav_location() {
        let html = r#"<html><body><nav><a href="/about">About</a></nav></body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let config = NormalizerConfig::new("example.com");
        let edges = extract(&doc, &base, &config);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dom_location, DomLocation::Nav);
        assert_eq!(edges[0].target_url, "https://example.com/about");
    }

    #[test]
    fn rel_nofollow_is_recorded() {
        let html = r#"<html><body><a href="/x" rel="nofollow sponsored">x</a></body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let config = NormalizerConfig::new("example.com");
        let edges = extract(&doc, &base, &config);
        assert!(edges[0].rel.nofollow);
        assert!(edges[0].rel.sponsored);
        assert!(!edges[0].rel.ugc);
    }

    #[test]
    fn dedups_identical_source_target_location_tuples() {
        let html = r#"<html><body><main><a href="/x">a</a><a href="/x">b</a></main></body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let config = NormalizerConfig::new("example.com");
        let edges = extract(&doc, &base, &config);
        assert_eq!(edges.len(), 1);
    }
}
