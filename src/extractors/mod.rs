//! Pure extractor functions over `(html, headers, optional DOM, url)`.
//!
//! Each extractor is a pure transform over a parsed `scraper::Html`
//! document rather than a live `page.evaluate()` call, so the same
//! extractor code runs identically for `raw` mode (static HTML, no
//! browser) and the rendered DOM HTML string produced by `renderer` for
//! `prerender`/`full`.

pub mod accessibility;
pub mod assets;
pub mod links;
pub mod metrics;
pub mod page_facts;
pub mod seo;
pub mod structured_data;
pub mod tech_detection;

use url::Url;

use crate::normalizer::NormalizerConfig;
use crate::renderer::RenderMode;

pub use accessibility::AccessibilityRecord;
pub use assets::AssetRecord;
pub use links::EdgeRecord;
pub use metrics::EnhancedMetrics;
pub use page_facts::PageFacts;
pub use seo::EnhancedSeo;
pub use structured_data::StructuredDataEntry;
pub use tech_detection::TechSignature;

/// Aggregate of everything the extractor families produce for one page.
/// Which optional fields are populated depends on `render_mode`.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub page_facts: PageFacts,
    pub links: Vec<EdgeRecord>,
    pub assets: Vec<AssetRecord>,
    pub seo: Option<EnhancedSeo>,
    pub metrics: Option<EnhancedMetrics>,
    pub accessibility: Option<AccessibilityRecord>,
    pub structured_data: Vec<StructuredDataEntry>,
    pub tech: Vec<TechSignature>,
}

/// Run every extractor family applicable to `render_mode` over `html`.
pub fn extract_all(
    html: &str,
    headers: &reqwest::header::HeaderMap,
    page_url: &Url,
    render_mode: RenderMode,
    normalizer_config: &NormalizerConfig,
) -> ExtractionResult {
    let document = scraper::Html::parse_document(html);

    let page_facts = page_facts::extract(&document, headers, page_url);
    let links = links::extract(&document, page_url, normalizer_config);
    let assets = assets::extract(&document, page_url);
    let structured_data = structured_data::extract(&document);

    // SEO and tech detection run from `prerender` upward (they need the
    // JS-settled DOM for accurate signal; `raw` mode only runs the
    // HTML-static page-facts family per the render-mode table).
    let (seo, tech) = if render_mode != RenderMode::Raw {
        (
            Some(seo::extract(&document, headers, page_url, &structured_data)),
            tech_detection::extract(&document, headers),
        )
    } else {
        (None, Vec::new())
    };

    let metrics = if render_mode != RenderMode::Raw {
        Some(metrics::extract(&document, headers, page_url))
    } else {
        None
    };

    let accessibility = match render_mode {
        RenderMode::Raw => Some(accessibility::extract_static(&document)),
        RenderMode::Prerender => Some(accessibility::extract_dom(&document)),
        RenderMode::Full => Some(accessibility::extract_runtime(&document)),
    };

    ExtractionResult {
        page_facts,
        links,
        assets,
        seo,
        metrics,
        accessibility,
        structured_data,
        tech,
    }
}
