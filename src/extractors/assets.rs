//! Asset extraction: images, video/audio/source, scripts, stylesheets.

use scraper::{Html, Selector};
use url::Url;

const MAX_ASSETS_PER_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
    Source,
    Script,
    Stylesheet,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AssetRecord {
    pub kind: AssetKind,
    pub url: String,
    pub alt_text: Option<String>,
}

pub fn extract(document: &Html, page_url: &Url) -> Vec<AssetRecord> {
    let mut assets = Vec::new();
    push_attr(document, page_url, "img[src]", "src", AssetKind::Image, &mut assets, true);
    push_attr(document, page_url, "video[src]", "src", AssetKind::Video, &mut assets, false);
    push_attr(document, page_url, "audio[src]", "src", AssetKind::Audio, &mut assets, false);
    push_attr(document, page_url, "source[src]", "src", AssetKind::Source, &mut assets, false);
    push_attr(document, page_url, "script[src]", "src", AssetKind::Script, &mut assets, false);
    push_attr(
        document,
        page_url,
        "link[rel=stylesheet][href]",
        "href",
        AssetKind::Stylesheet,
        &mut assets,
        false,
    );

    if assets.len() > MAX_ASSETS_PER_PAGE {
        tracing::debug!(
            "page at {page_url} has {} assets, truncating to {MAX_ASSETS_PER_PAGE}",
            assets.len()
        );
        assets.truncate(MAX_ASSETS_PER_PAGE);
    }
    assets
}

fn push_attr(
    document: &Html,
    page_url: &Url,
    selector: &str,
    attr: &str,
    kind: AssetKind,
    out: &mut Vec<AssetRecord>,
    with_alt: bool,
) {
    if out.len() >= MAX_ASSETS_PER_PAGE {
        return;
    }
    let Ok(sel) = Selector::parse(selector) else {
        return;
    };
    for element in document.select(&sel) {
        if out.len() >= MAX_ASSETS_PER_PAGE {
            break;
        }
        let Some(value) = element.value().attr(attr) else {
            continue;
        };
        let Ok(resolved) = page_url.join(value) else {
            continue;
        };
        out.push(AssetRecord {
            kind,
            url: resolved.to_string(),
            alt_text: if with_alt {
                element.value().attr("alt").map(str::to_string)
            } else {
                None
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_images_with_alt_text() {
        let html = r#"<html><body><img src="/a.png" alt="A pic"></body></html>"#;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://example.com/").unwrap();
        let assets = extract(&doc, &base);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].kind, AssetKind::Image);
        assert_eq!(assets[0].alt_text.as_deref(), Some("A pic"));
    }

    #[test]
    fn caps_at_max_assets_per_page() {
        let mut html = String::from("<html><body>");
        for i in 0..1200 {
            html.push_str(&format!("<img src=\"/{i}.png\">"));
        }
        html.push_str("</body></html>");
        let doc = Html::parse_document(&html);
        let base = Url::parse("https://example.com/").unwrap();
        let assets = extract(&doc, &base);
        assert_eq!(assets.len(), MAX_ASSETS_PER_PAGE);
    }
}
