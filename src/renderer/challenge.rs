//! Bot-protection/challenge-page detection.

use chromiumoxide::Page;

/// DOM title/body keywords associated with well-known bot-protection
/// providers and generic "checking your browser" interstitials.
const CHALLENGE_KEYWORDS: &[&str] = &[
    "checking your browser",
    "just a moment",
    "attention required",
    "ddos protection by",
    "cloudflare",
    "please wait while we verify",
    "enable javascript and cookies",
];

/// A provider's signature, named for diagnostics.
pub struct ChallengePatterns;

impl ChallengePatterns {
    #[must_use]
    pub fn matches(title_and_body: &str) -> bool {
        let lower = title_and_body.to_ascii_lowercase();
        CHALLENGE_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }
}

/// Status in {403, 503} AND DOM matches a known challenge pattern.
pub async fn is_challenge_response(status: u16, page: &Page) -> bool {
    if status != 403 && status != 503 {
        return false;
    }
    let sample = page
        .evaluate("(document.title || '') + ' ' + (document.body ? document.body.innerText.slice(0, 2000) : '')")
        .await
        .ok()
        .and_then(|r| r.into_value::<String>().ok())
        .unwrap_or_default();
    ChallengePatterns::matches(&sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_common_challenge_phrasing() {
        assert!(ChallengePatterns::matches("Just a moment... Cloudflare"));
        assert!(ChallengePatterns::matches("DDoS protection by SomeVendor"));
    }

    #[test]
    fn ordinary_page_text_is_not_a_challenge() {
        assert!(!ChallengePatterns::matches("Welcome to our blog"));
    }
}
