//! URL normalization: resolve a raw href against a base URL into a canonical
//! form, compute its content-addressed key, and classify/filter it.
//!
//! Grounded on `imurl::ImUrl` (cheap-clone `Arc<Url>` wrapper); this module
//! adds the param-policy, tracking-blocklist, and allow/deny pattern layers
//! the crawler needs on top of that wrapper.

mod key;
mod patterns;

pub use key::UrlKey;
pub use patterns::{PatternSet, PatternSetError};

use std::collections::HashSet;

use globset::Glob;
use url::Url;

use crate::imurl::ImUrl;

/// How query parameters are treated during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamPolicy {
    /// Preserve every query parameter, sorted lexicographically by key.
    Keep,
    /// Drop the query string entirely.
    Strip,
    /// Drop only parameters in the tracking blocklist, keep the rest (sorted).
    #[default]
    Sample,
}

/// Default tracking-parameter blocklist applied under [`ParamPolicy::Sample`].
pub fn default_tracking_blocklist() -> HashSet<String> {
    [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
        "gclid",
        "fbclid",
        "mc_eid",
        "ref",
        "_hsenc",
        "_hsmi",
        "mkt_tok",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Why a candidate URL was rejected during normalization.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    UnsupportedScheme { scheme: String },
    ParseError { message: String },
    DeniedByPattern { pattern: String },
    NotAllowListed,
}

/// Successful outcome of normalizing a link.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub normalized_url: ImUrl,
    pub url_key: UrlKey,
    pub is_external: bool,
}

/// Configuration driving the normalizer's param and allow/deny policies.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub param_policy: ParamPolicy,
    pub tracking_blocklist: HashSet<String>,
    pub allow_patterns: PatternSet,
    pub deny_patterns: PatternSet,
    /// Host of the seed URL; any other host is classified `is_external`.
    pub origin_host: String,
}

impl NormalizerConfig {
    #[must_use]
    pub fn new(origin_host: impl Into<String>) -> Self {
        Self {
            param_policy: ParamPolicy::default(),
            tracking_blocklist: default_tracking_blocklist(),
            allow_patterns: PatternSet::empty(),
            deny_patterns: PatternSet::empty(),
            origin_host: origin_host.into(),
        }
    }
}

/// Normalize `raw_href` against `base_url`, returning either a canonical
/// outcome or the reason it was rejected.
///
/// Pure and deterministic: identical inputs always produce identical
/// outputs, with no I/O and no reliance on ambient state.
pub fn normalize(
    raw_href: &str,
    base_url: &Url,
    config: &NormalizerConfig,
) -> Result<NormalizeOutcome, RejectReason> {
    let resolved = Url::options()
        .base_url(Some(base_url))
        .parse(raw_href)
        .map_err(|e| RejectReason::ParseError {
            message: e.to_string(),
        })?;

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return Err(RejectReason::UnsupportedScheme {
            scheme: resolved.scheme().to_string(),
        });
    }

    let canonical = canonicalize(&resolved, config);
    let canonical_str = canonical.as_str();

    if let Some(pattern) = config.deny_patterns.first_match(canonical_str) {
        return Err(RejectReason::DeniedByPattern { pattern });
    }
    if !config.allow_patterns.is_empty() && config.allow_patterns.first_match(canonical_str).is_none() {
        return Err(RejectReason::NotAllowListed);
    }

    let normalized_url = ImUrl::parse(canonical_str).map_err(|e| RejectReason::ParseError {
        message: e.to_string(),
    })?;
    let url_key = UrlKey::from_canonical(canonical_str);
    let is_external = canonical
        .host_str()
        .is_some_and(|h| !h.eq_ignore_ascii_case(&config.origin_host));

    Ok(NormalizeOutcome {
        normalized_url,
        url_key,
        is_external,
    })
}

/// Ordered normalization: lowercase host, strip default port, drop fragment,
/// apply param policy, sort remaining params, stable percent-encoding
/// (`url::Url` already encodes consistently on mutation).
fn canonicalize(resolved: &Url, config: &NormalizerConfig) -> Url {
    let mut url = resolved.clone();

    // `url::Url` lowercases and punycode-encodes the host during parsing
    // already (host_str() is always lowercase ASCII for http(s) URLs), and
    // strips the default port automatically. Nothing to do here but make
    // the invariant explicit for readers.
    debug_assert!(url.host_str().is_none_or(|h| h == h.to_ascii_lowercase()));

    url.set_fragment(None);

    match config.param_policy {
        ParamPolicy::Keep => sort_query(&mut url, |_| true),
        ParamPolicy::Strip => url.set_query(None),
        ParamPolicy::Sample => {
            sort_query(&mut url, |key| !config.tracking_blocklist.contains(key));
        }
    }

    url
}

fn sort_query(url: &mut Url, keep: impl Fn(&str) -> bool) {
    let Some(query) = url.query() else {
        return;
    };
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(k, _)| keep(k))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        serializer.append_pair(k, v);
    }
    url.set_query(Some(&serializer.finish()));
}

/// Compile a glob (default) or `/.../`-wrapped regex pattern into a matcher
/// usable by [`PatternSet`]. Exposed for config-loading code.
pub fn compile_glob(pattern: &str) -> Result<Glob, globset::Error> {
    Glob::new(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/a/b/").unwrap()
    }

    fn cfg() -> NormalizerConfig {
        NormalizerConfig::new("example.com")
    }

    #[test]
    fn resolves_relative_links() {
        let outcome = normalize("../c?z=1&a=2", &base(), &cfg()).unwrap();
        assert_eq!(outcome.normalized_url.as_str(), "https://example.com/a/c?a=2&z=1");
        assert!(!outcome.is_external);
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = normalize("mailto:a@b.com", &base(), &cfg()).unwrap_err();
        assert!(matches!(err, RejectReason::UnsupportedScheme { .. }));
    }

    #[test]
    fn strips_fragment_and_default_port() {
        let outcome = normalize("https://example.com:443/x#section", &base(), &cfg()).unwrap();
        assert_eq!(outcome.normalized_url.as_str(), "https://example.com/x");
    }

    #[test]
    fn sample_policy_drops_only_tracking_params() {
        let outcome = normalize(
            "/x?utm_source=news&id=42",
            &base(),
            &cfg(),
        )
        .unwrap();
        assert_eq!(outcome.normalized_url.as_str(), "https://example.com/x?id=42");
    }

    #[test]
    fn strip_policy_drops_all_params() {
        let mut c = cfg();
        c.param_policy = ParamPolicy::Strip;
        let outcome = normalize("/x?id=42", &base(), &c).unwrap();
        assert_eq!(outcome.normalized_url.as_str(), "https://example.com/x");
    }

    #[test]
    fn is_deterministic() {
        let a = normalize("/x?b=2&a=1", &base(), &cfg()).unwrap();
        let b = normalize("/x?b=2&a=1", &base(), &cfg()).unwrap();
        assert_eq!(a.normalized_url.as_str(), b.normalized_url.as_str());
        assert_eq!(a.url_key, b.url_key);
    }

    #[test]
    fn external_host_is_classified() {
        let outcome = normalize("https://other.com/x", &base(), &cfg()).unwrap();
        assert!(outcome.is_external);
    }

    #[test]
    fn deny_pattern_rejects_match() {
        let mut c = cfg();
        c.deny_patterns = PatternSet::compile(&["*/admin/*".to_string()]).unwrap();
        let err = normalize("/admin/secret", &base(), &c).unwrap_err();
        assert!(matches!(err, RejectReason::DeniedByPattern { .. }));
    }

    #[test]
    fn non_empty_allow_list_rejects_unmatched() {
        let mut c = cfg();
        c.allow_patterns = PatternSet::compile(&["*/blog/*".to_string()]).unwrap();
        let err = normalize("/about", &base(), &c).unwrap_err();
        assert!(matches!(err, RejectReason::NotAllowListed));
    }

    #[test]
    fn regex_pattern_form_is_supported() {
        let mut c = cfg();
        c.deny_patterns = PatternSet::compile(&["/\\.pdf$/".to_string()]).unwrap();
        let err = normalize("/files/report.pdf", &base(), &c).unwrap_err();
        assert!(matches!(err, RejectReason::DeniedByPattern { .. }));
    }
}
