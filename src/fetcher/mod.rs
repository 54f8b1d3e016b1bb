//! Plain HTTP retrieval for URLs that don't need a browser (robots.txt, raw
//! mode, favicons), with retry/backoff.
//!
//! Built on a `reqwest::Client` (rustls-tls) with bounded-attempt,
//! doubling-backoff retry jittered via `rand`.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::CrawlError;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// A successfully fetched response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: Vec<u8>,
    pub fetch_duration: Duration,
}

/// Fetch `url` with up to [`MAX_ATTEMPTS`] attempts, retrying connection
/// resets, timeouts, 429, 503, and other 5xx with exponential backoff
/// (1s, 2s, 4s, capped at 5s) plus jitter. Other 4xx responses are returned
/// immediately without retry (they are not transient).
pub async fn fetch(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<FetchedResponse, CrawlError> {
    let mut attempt = 0u32;
    let mut backoff = INITIAL_BACKOFF;
    let mut last_error: Option<anyhow::Error> = None;

    while attempt < MAX_ATTEMPTS {
        attempt += 1;
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, http.get(url).send()).await;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() || (status.is_client_error() && status.as_u16() != 429) {
                    let headers = response.headers().clone();
                    let body = response.bytes().await.map_err(|e| CrawlError::FetchFailed {
                        url: url.to_string(),
                        source: e.into(),
                    })?;
                    return Ok(FetchedResponse {
                        status: status.as_u16(),
                        headers,
                        body: body.to_vec(),
                        fetch_duration: started.elapsed(),
                    });
                }
                // Retryable: 429, 503, or any other 5xx.
                last_error = Some(anyhow::anyhow!("HTTP {status}"));
            }
            Ok(Err(err)) => {
                last_error = Some(err.into());
            }
            Err(_elapsed) => {
                last_error = Some(anyhow::anyhow!("request timed out after {timeout:?}"));
            }
        }

        if attempt < MAX_ATTEMPTS {
            let jitter = Duration::from_millis(rand::rng().random_range(0..250));
            tokio::time::sleep(backoff + jitter).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    Err(CrawlError::FetchFailed {
        url: url.to_string(),
        source: last_error.unwrap_or_else(|| anyhow::anyhow!("exhausted retries")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_against_a_mock_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/ok", server.url());

        let response = fetch(&client, &url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_retryable_4xx_returns_immediately() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/missing", server.url());

        let response = fetch(&client, &url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(response.status, 404);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_5xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/broken")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/broken", server.url());

        let err = fetch(&client, &url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CrawlError::FetchFailed { .. }));
        mock.assert_async().await;
    }
}
