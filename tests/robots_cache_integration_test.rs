//! Integration coverage for [`atlas_crawler::robots::RobotsCache`] against a
//! real HTTP server: fetch-once-then-cache behavior and rule evaluation.

use atlas_crawler::robots::RobotsCache;
use url::Url;

#[tokio::test]
async fn disallowed_path_is_blocked_and_allowed_path_passes() {
    let mut server = mockito::Server::new_async().await;
    let _robots_mock = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("User-agent: *\nDisallow: /private\n")
        .expect(1)
        .create_async()
        .await;

    let cache = RobotsCache::new(reqwest::Client::new(), "AtlasCrawler/test".to_string(), None);

    let disallowed = Url::parse(&format!("{}/private/page", server.url())).unwrap();
    let outcome = cache.allowed(&disallowed).await.unwrap();
    assert!(!outcome.allow);
    assert!(outcome.matched_rule.is_some());

    let allowed = Url::parse(&format!("{}/public/page", server.url())).unwrap();
    let outcome = cache.allowed(&allowed).await.unwrap();
    assert!(outcome.allow);

    // Second origin-matching request must not refetch robots.txt (the
    // mock's `expect(1)` is verified on drop).
}

#[tokio::test]
async fn missing_robots_txt_allows_everything() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;

    let cache = RobotsCache::new(reqwest::Client::new(), "AtlasCrawler/test".to_string(), None);
    let url = Url::parse(&format!("{}/anything", server.url())).unwrap();
    let outcome = cache.allowed(&url).await.unwrap();
    assert!(outcome.allow);
}
