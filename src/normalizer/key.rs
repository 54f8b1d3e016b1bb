//! Content-addressed URL key: an 80-bit BLAKE3 digest of a canonical URL.

use std::fmt;

/// Short cryptographic digest identifying a canonical URL.
///
/// BLAKE3 is used (truncated to 10 bytes / 80 bits) rather than SHA-256
/// because this is a high-volume hot-path key used purely for in-memory
/// dedup and map lookups, not a published integrity digest; the archive's
/// part/manifest hashes (which downstream readers verify) stay on SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlKey([u8; 10]);

impl UrlKey {
    #[must_use]
    pub fn from_canonical(canonical_url: &str) -> Self {
        let digest = blake3::hash(canonical_url.as_bytes());
        let mut bytes = [0u8; 10];
        bytes.copy_from_slice(&digest.as_bytes()[..10]);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 10] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for UrlKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for UrlKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != 10 {
            return Err(serde::de::Error::custom("url_key must be 10 bytes (80 bits)"));
        }
        let mut arr = [0u8; 10];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_yields_same_key() {
        let a = UrlKey::from_canonical("https://example.com/x");
        let b = UrlKey::from_canonical("https://example.com/x");
        assert_eq!(a, b);
    }

    #[test]
    fn different_input_yields_different_key() {
        let a = UrlKey::from_canonical("https://example.com/x");
        let b = UrlKey::from_canonical("https://example.com/y");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip_via_serde() {
        let key = UrlKey::from_canonical("https://example.com/x");
        let json = serde_json::to_string(&key).unwrap();
        let back: UrlKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
