//! Property: normalizing an already-canonical URL a second time is a no-op
//! (§8 P10). Exercised over a battery of generated path/query/fragment
//! shapes rather than a fixed example list.

use atlas_crawler::normalizer::{normalize, NormalizerConfig};
use proptest::prelude::*;
use url::Url;

fn base() -> Url {
    Url::parse("https://example.com/").unwrap()
}

fn cfg() -> NormalizerConfig {
    NormalizerConfig::new("example.com")
}

fn path_segment() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn query_pair() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,6}", "[a-z0-9]{1,6}")
}

proptest! {
    #[test]
    fn normalizing_a_canonical_url_twice_is_idempotent(
        segments in prop::collection::vec(path_segment(), 0..4),
        pairs in prop::collection::vec(query_pair(), 0..4),
        fragment in "[a-z]{0,6}",
    ) {
        let mut href = format!("/{}", segments.join("/"));
        if !pairs.is_empty() {
            let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            href.push('?');
            href.push_str(&query.join("&"));
        }
        if !fragment.is_empty() {
            href.push('#');
            href.push_str(&fragment);
        }

        let first = normalize(&href, &base(), &cfg());
        let Ok(first) = first else {
            return Ok(());
        };
        let canonical = first.normalized_url.as_str().to_string();
        let canonical_url = Url::parse(&canonical).unwrap();

        let second = normalize(canonical.as_str(), &canonical_url, &cfg()).unwrap();

        prop_assert_eq!(first.normalized_url.as_str(), second.normalized_url.as_str());
        prop_assert_eq!(first.url_key, second.url_key);
    }
}

#[test]
fn fragment_only_difference_collapses_to_the_same_key() {
    let a = normalize("/x#one", &base(), &cfg()).unwrap();
    let b = normalize("/x#two", &base(), &cfg()).unwrap();
    assert_eq!(a.url_key, b.url_key);
}

#[test]
fn query_param_order_does_not_change_the_key() {
    let a = normalize("/x?b=2&a=1", &base(), &cfg()).unwrap();
    let b = normalize("/x?a=1&b=2", &base(), &cfg()).unwrap();
    assert_eq!(a.url_key, b.url_key);
}
