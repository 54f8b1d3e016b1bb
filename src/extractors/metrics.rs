//! Enhanced metrics: encoding, resource counts, mixed-content, SRI coverage.

use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EnhancedMetrics {
    /// Content-Type header charset, else meta-charset, else a naive
    /// UTF-8-validity detection fallback.
    pub encoding: String,
    pub css_count: usize,
    pub js_count: usize,
    pub font_count: usize,
    pub inline_script_count: usize,
    pub inline_style_count: usize,
    pub content_encoding: Option<String>,
    pub has_viewport_meta: bool,
    pub mixed_content_urls: Vec<String>,
    pub sri_coverage_ratio: f64,
}

pub fn extract(document: &Html, headers: &reqwest::header::HeaderMap, page_url: &Url) -> EnhancedMetrics {
    let encoding = detect_encoding(document, headers);
    let css_count = count(document, "link[rel=stylesheet]");
    let js_count = count(document, "script[src]");
    let font_count = count(document, "link[rel=preload][as=font], link[rel=font]");
    let inline_script_count = count(document, "script:not([src])");
    let inline_style_count = count(document, "style");
    let content_encoding = headers
        .get(reqwest::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let has_viewport_meta = document
        .select(&Selector::parse("meta[name=viewport]").unwrap())
        .next()
        .is_some();

    let is_https_page = page_url.scheme() == "https";
    let mut mixed_content_urls = Vec::new();
    let mut sri_eligible = 0usize;
    let mut sri_present = 0usize;

    if let Ok(sel) = Selector::parse("script[src], link[rel=stylesheet][href]") {
        for element in document.select(&sel) {
            let attr = if element.value().name() == "script" { "src" } else { "href" };
            let Some(raw) = element.value().attr(attr) else {
                continue;
            };
            if is_https_page && raw.starts_with("http://") {
                mixed_content_urls.push(raw.to_string());
            }
            if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("//") {
                sri_eligible += 1;
                if element.value().attr("integrity").is_some() {
                    sri_present += 1;
                }
            }
        }
    }
    let sri_coverage_ratio = if sri_eligible == 0 {
        1.0
    } else {
        sri_present as f64 / sri_eligible as f64
    };

    EnhancedMetrics {
        encoding,
        css_count,
        js_count,
        font_count,
        inline_script_count,
        inline_style_count,
        content_encoding,
        has_viewport_meta,
        mixed_content_urls,
        sri_coverage_ratio,
    }
}

fn detect_encoding(document: &Html, headers: &reqwest::header::HeaderMap) -> String {
    if let Some(content_type) = headers.get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        if let Some(charset) = content_type.split(';').find_map(|part| {
            let part = part.trim();
            part.strip_prefix("charset=")
        }) {
            return charset.trim_matches('"').to_string();
        }
    }
    if let Ok(sel) = Selector::parse("meta[charset]") {
        if let Some(charset) = document.select(&sel).next().and_then(|e| e.value().attr("charset")) {
            return charset.to_string();
        }
    }
    "utf-8".to_string()
}

fn count(document: &Html, selector: &str) -> usize {
    Selector::parse(selector).map(|s| document.select(&s).count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_header_wins_over_meta_charset() {
        let html = r#"<html><head><meta charset="iso-8859-1"></head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "text/html; charset=utf-8".parse().unwrap(),
        );
        let metrics = extract(&doc, &headers, &base);
        assert_eq!(metrics.encoding, "utf-8");
    }

    #[test]
    fn detects_mixed_content_on_https_page() {
        let html = r#"<html><head><script src="http://insecure.example/a.js"></script></head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let metrics = extract(&doc, &reqwest::header::HeaderMap::new(), &base);
        assert_eq!(metrics.mixed_content_urls.len(), 1);
    }

    #[test]
    fn sri_coverage_counts_integrity_attribute() {
        let html = r#"<html><head>
            <script src="https://cdn.example/a.js" integrity="sha384-x"></script>
            <script src="https://cdn.example/b.js"></script>
        </head></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let metrics = extract(&doc, &reqwest::header::HeaderMap::new(), &base);
        assert!((metrics.sri_coverage_ratio - 0.5).abs() < f64::EPSILON);
    }
}
