//! Structured-data extraction: JSON-LD script blocks and microdata `itemtype`s.

use scraper::{Html, Selector};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum StructuredDataEntry {
    JsonLd { value: serde_json::Value },
    Microdata { item_type: String },
}

pub fn extract(document: &Html) -> Vec<StructuredDataEntry> {
    let mut entries = Vec::new();

    if let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for element in document.select(&sel) {
            let text: String = element.text().collect();
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => entries.push(StructuredDataEntry::JsonLd { value }),
                Err(err) => tracing::debug!("skipping malformed JSON-LD block: {err}"),
            }
        }
    }

    if let Ok(sel) = Selector::parse("[itemtype]") {
        for element in document.select(&sel) {
            if let Some(item_type) = element.value().attr("itemtype") {
                entries.push(StructuredDataEntry::Microdata {
                    item_type: item_type.to_string(),
                });
            }
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_ld_blocks() {
        let html = r#"<html><head><script type="application/ld+json">{"@type":"Article"}</script></head></html>"#;
        let doc = Html::parse_document(html);
        let entries = extract(&doc);
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], StructuredDataEntry::JsonLd { .. }));
    }

    #[test]
    fn enumerates_microdata_itemtypes() {
        let html = r#"<html><body><div itemtype="https://schema.org/Product"></div></body></html>"#;
        let doc = Html::parse_document(html);
        let entries = extract(&doc);
        assert!(matches!(entries[0], StructuredDataEntry::Microdata { .. }));
    }

    #[test]
    fn malformed_json_ld_is_skipped_not_fatal() {
        let html = r#"<html><head><script type="application/ld+json">{not json}</script></head></html>"#;
        let doc = Html::parse_document(html);
        let entries = extract(&doc);
        assert!(entries.is_empty());
    }
}
