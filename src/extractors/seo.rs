//! Enhanced SEO extraction: indexability, OG/Twitter, hreflang consistency.

use scraper::{Html, Selector};
use url::Url;

use super::structured_data::StructuredDataEntry;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub og_type: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TwitterCard {
    pub card: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EnhancedSeo {
    /// `true` only if neither meta-robots nor X-Robots-Tag says `noindex`
    /// (union semantics: either source saying `noindex` wins).
    pub indexable: bool,
    pub followable: bool,
    pub title_length: usize,
    pub description_length: usize,
    pub heading_level_counts: [usize; 6],
    pub word_count: usize,
    pub hreflang_has_self_reference: bool,
    pub hreflang_has_x_default: bool,
    pub open_graph: OpenGraph,
    pub twitter_card: TwitterCard,
    pub structured_data_types: Vec<String>,
}

pub fn extract(
    document: &Html,
    headers: &reqwest::header::HeaderMap,
    page_url: &Url,
    structured_data: &[StructuredDataEntry],
) -> EnhancedSeo {
    let robots_meta = meta_content(document, "robots").unwrap_or_default().to_ascii_lowercase();
    let x_robots_tag = headers
        .get("x-robots-tag")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let combined = format!("{robots_meta} {x_robots_tag}");
    let indexable = !combined.contains("noindex");
    let followable = !combined.contains("nofollow");

    let title = select_text(document, "title").unwrap_or_default();
    let description = meta_content(document, "description").unwrap_or_default();

    let word_count = document
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .count();

    let hreflangs: Vec<String> = Selector::parse("link[rel=alternate][hreflang]")
        .ok()
        .map(|sel| {
            document
                .select(&sel)
                .filter_map(|e| e.value().attr("hreflang"))
                .map(str::to_ascii_lowercase)
                .collect()
        })
        .unwrap_or_default();
    let hreflang_has_x_default = hreflangs.iter().any(|h| h == "x-default");
    let page_lang = select_attr(document, "html", "lang").map(|l| l.to_ascii_lowercase());
    let hreflang_has_self_reference = page_lang.is_some_and(|lang| hreflangs.iter().any(|h| h == &lang));

    let open_graph = OpenGraph {
        title: meta_property(document, "og:title"),
        description: meta_property(document, "og:description"),
        image: meta_property(document, "og:image"),
        og_type: meta_property(document, "og:type"),
        url: meta_property(document, "og:url"),
    };
    let twitter_card = TwitterCard {
        card: meta_content(document, "twitter:card"),
        title: meta_content(document, "twitter:title"),
        description: meta_content(document, "twitter:description"),
        image: meta_content(document, "twitter:image"),
    };

    let structured_data_types = structured_data
        .iter()
        .filter_map(|entry| match entry {
            StructuredDataEntry::JsonLd { value } => value
                .get("@type")
                .and_then(|t| t.as_str())
                .map(str::to_string),
            StructuredDataEntry::Microdata { item_type } => Some(item_type.clone()),
        })
        .collect();

    let _ = page_url;
    EnhancedSeo {
        indexable,
        followable,
        title_length: title.chars().count(),
        description_length: description.chars().count(),
        heading_level_counts: [
            count(document, "h1"),
            count(document, "h2"),
            count(document, "h3"),
            count(document, "h4"),
            count(document, "h5"),
            count(document, "h6"),
        ],
        word_count,
        hreflang_has_self_reference,
        hreflang_has_x_default,
        open_graph,
        twitter_card,
        structured_data_types,
    }
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector).map(|s| document.select(&s).count()).unwrap_or(0)
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document.select(&sel).next().map(|e| e.text().collect::<String>().trim().to_string())
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document.select(&sel).next().and_then(|e| e.value().attr(attr)).map(str::to_string)
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse(&format!("meta[name=\"{name}\" i]")).ok()?;
    document.select(&sel).next().and_then(|e| e.value().attr("content")).map(str::to_string)
}

fn meta_property(document: &Html, property: &str) -> Option<String> {
    let sel = Selector::parse(&format!("meta[property=\"{property}\" i]")).ok()?;
    document.select(&sel).next().and_then(|e| e.value().attr("content")).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noindex_meta_wins_union_semantics() {
        let html = r#"<html><head><meta name="robots" content="noindex"></head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let seo = extract(&doc, &reqwest::header::HeaderMap::new(), &base, &[]);
        assert!(!seo.indexable);
    }

    #[test]
    fn x_robots_tag_noindex_overrides_permissive_meta() {
        let html = "<html><head></head></html>";
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-robots-tag", "noindex".parse().unwrap());
        let seo = extract(&doc, &headers, &base, &[]);
        assert!(!seo.indexable);
    }

    #[test]
    fn extracts_open_graph_tags() {
        let html = r#"<html><head><meta property="og:title" content="T"></head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let seo = extract(&doc, &reqwest::header::HeaderMap::new(), &base, &[]);
        assert_eq!(seo.open_graph.title.as_deref(), Some("T"));
    }
}
