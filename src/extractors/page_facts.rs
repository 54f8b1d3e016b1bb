//! Page facts: title, headings, canonical, robots directives, favicon, counts.

use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HeadingOutline {
    pub h1: Vec<String>,
    pub h2_count: usize,
    pub h3_count: usize,
    pub h4_count: usize,
    pub h5_count: usize,
    pub h6_count: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageFacts {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: HeadingOutline,
    pub canonical_raw: Option<String>,
    pub canonical_resolved: Option<String>,
    pub robots_meta: Option<String>,
    pub x_robots_tag: Option<String>,
    pub hreflang: Vec<(String, String)>,
    pub favicon_url: String,
    pub link_count: usize,
    pub media_count: usize,
    pub images_missing_alt: usize,
}

pub fn extract(document: &Html, headers: &reqwest::header::HeaderMap, page_url: &Url) -> PageFacts {
    let title = select_text(document, "title");
    let meta_description = meta_content(document, "description");
    let headings = extract_headings(document);
    let canonical_raw = select_attr(document, "link[rel=canonical]", "href");
    let canonical_resolved = canonical_raw
        .as_deref()
        .and_then(|href| page_url.join(href).ok())
        .map(|u| u.to_string());
    let robots_meta = meta_content(document, "robots");
    let x_robots_tag = headers
        .get("x-robots-tag")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let hreflang = extract_hreflang(document);
    let favicon_url = select_attr(document, "link[rel~=icon]", "href")
        .and_then(|href| page_url.join(&href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| {
            page_url
                .join("/favicon.ico")
                .map(|u| u.to_string())
                .unwrap_or_default()
        });

    let link_count = document
        .select(&Selector::parse("a[href]").unwrap())
        .count();
    let media_count = document
        .select(&Selector::parse("img,video,audio").unwrap())
        .count();
    let images_missing_alt = document
        .select(&Selector::parse("img").unwrap())
        .filter(|el| el.value().attr("alt").is_none_or(str::is_empty))
        .count();

    PageFacts {
        title,
        meta_description,
        headings,
        canonical_raw,
        canonical_resolved,
        robots_meta,
        x_robots_tag,
        hreflang,
        favicon_url,
        link_count,
        media_count,
        images_missing_alt,
    }
}

fn extract_headings(document: &Html) -> HeadingOutline {
    let mut outline = HeadingOutline::default();
    if let Ok(sel) = Selector::parse("h1") {
        outline.h1 = document.select(&sel).map(|e| e.text().collect()).collect();
    }
    outline.h2_count = count(document, "h2");
    outline.h3_count = count(document, "h3");
    outline.h4_count = count(document, "h4");
    outline.h5_count = count(document, "h5");
    outline.h6_count = count(document, "h6");
    outline
}

fn extract_hreflang(document: &Html) -> Vec<(String, String)> {
    let Ok(sel) = Selector::parse("link[rel=alternate][hreflang]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let lang = el.value().attr("hreflang")?;
            let href = el.value().attr("href")?;
            Some((lang.to_string(), href.to_string()))
        })
        .collect()
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_description() {
        let html = r#"<html><head><title>Hi</title><meta name="description" content="desc"></head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let facts = extract(&doc, &reqwest::header::HeaderMap::new(), &base);
        assert_eq!(facts.title.as_deref(), Some("Hi"));
        assert_eq!(facts.meta_description.as_deref(), Some("desc"));
    }

    #[test]
    fn falls_back_to_origin_favicon() {
        let html = "<html></html>";
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/a/b").unwrap();
        let facts = extract(&doc, &reqwest::header::HeaderMap::new(), &base);
        assert_eq!(facts.favicon_url, "https://example.com/favicon.ico");
    }

    #[test]
    fn counts_images_missing_alt() {
        let html = r#"<html><body><img src="a.png"><img src="b.png" alt="b"></body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let facts = extract(&doc, &reqwest::header::HeaderMap::new(), &base);
        assert_eq!(facts.images_missing_alt, 1);
    }
}
