//! Technology detection via signature matching against HTML patterns,
//! script URLs, meta generators, and response headers.

use scraper::{Html, Selector};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TechSignature {
    pub name: String,
    pub categories: Vec<String>,
    pub version: Option<String>,
    pub confidence: f64,
}

struct Signature {
    name: &'static str,
    categories: &'static [&'static str],
    meta_generator_contains: Option<&'static str>,
    script_src_contains: Option<&'static str>,
    header_name: Option<&'static str>,
    header_value_contains: Option<&'static str>,
    html_contains: Option<&'static str>,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        name: "WordPress",
        categories: &["cms"],
        meta_generator_contains: Some("WordPress"),
        script_src_contains: Some("/wp-content/"),
        header_name: None,
        header_value_contains: None,
        html_contains: None,
    },
    Signature {
        name: "Shopify",
        categories: &["ecommerce"],
        meta_generator_contains: None,
        script_src_contains: Some("cdn.shopify.com"),
        header_name: Some("x-shopify-stage"),
        header_value_contains: None,
        html_contains: None,
    },
    Signature {
        name: "React",
        categories: &["javascript-framework"],
        meta_generator_contains: None,
        script_src_contains: None,
        header_name: None,
        header_value_contains: None,
        html_contains: Some("data-reactroot"),
    },
    Signature {
        name: "Next.js",
        categories: &["javascript-framework"],
        meta_generator_contains: None,
        script_src_contains: Some("/_next/static/"),
        header_name: None,
        header_value_contains: None,
        html_contains: None,
    },
    Signature {
        name: "Cloudflare",
        categories: &["cdn"],
        meta_generator_contains: None,
        script_src_contains: None,
        header_name: Some("cf-ray"),
        header_value_contains: None,
        html_contains: None,
    },
    Signature {
        name: "Google Analytics",
        categories: &["analytics"],
        meta_generator_contains: None,
        script_src_contains: Some("www.googletagmanager.com/gtag"),
        header_name: None,
        header_value_contains: None,
        html_contains: None,
    },
];

pub fn extract(document: &Html, headers: &reqwest::header::HeaderMap) -> Vec<TechSignature> {
    let generator = meta_content(document, "generator").unwrap_or_default();
    let script_srcs: Vec<&str> = Selector::parse("script[src]")
        .ok()
        .map(|sel| {
            document
                .select(&sel)
                .filter_map(|e| e.value().attr("src"))
                .collect()
        })
        .unwrap_or_default();
    let html_body = document.html();

    let mut results = Vec::new();
    for sig in SIGNATURES {
        let mut hits = 0u32;
        let mut checks = 0u32;

        if let Some(needle) = sig.meta_generator_contains {
            checks += 1;
            if generator.contains(needle) {
                hits += 1;
            }
        }
        if let Some(needle) = sig.script_src_contains {
            checks += 1;
            if script_srcs.iter().any(|s| s.contains(needle)) {
                hits += 1;
            }
        }
        if let (Some(name), _) = (sig.header_name, sig.header_value_contains) {
            checks += 1;
            let header_val = headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default();
            let matched = match sig.header_value_contains {
                Some(needle) => header_val.contains(needle),
                None => !header_val.is_empty(),
            };
            if matched {
                hits += 1;
            }
        }
        if let Some(needle) = sig.html_contains {
            checks += 1;
            if html_body.contains(needle) {
                hits += 1;
            }
        }

        if hits > 0 {
            results.push(TechSignature {
                name: sig.name.to_string(),
                categories: sig.categories.iter().map(|s| (*s).to_string()).collect(),
                version: None,
                confidence: hits as f64 / checks.max(1) as f64,
            });
        }
    }
    results
}

fn meta_content(document: &Html, name: &str) -> Option<String> {
    let sel = Selector::parse(&format!("meta[name=\"{name}\" i]")).ok()?;
    document.select(&sel).next().and_then(|e| e.value().attr("content")).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wordpress_via_generator_meta() {
        let html = r#"<html><head><meta name="generator" content="WordPress 6.4"></head></html>"#;
        let doc = Html::parse_document(html);
        let sigs = extract(&doc, &reqwest::header::HeaderMap::new());
        assert!(sigs.iter().any(|s| s.name == "WordPress"));
    }

    #[test]
    fn detects_cloudflare_via_header() {
        let doc = Html::parse_document("<html></html>");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("cf-ray", "abc123".parse().unwrap());
        let sigs = extract(&doc, &headers);
        assert!(sigs.iter().any(|s| s.name == "Cloudflare"));
    }

    #[test]
    fn no_signatures_on_plain_page() {
        let doc = Html::parse_document("<html><body>hello</body></html>");
        let sigs = extract(&doc, &reqwest::header::HeaderMap::new());
        assert!(sigs.is_empty());
    }
}
