use crate::util::sha256_hex_fields;

/// Opaque cache key; a pure function of provider, language and requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for a generation request.
pub fn derive_key(provider: &str, language: &str, requirement: &str) -> CacheKey {
    CacheKey(sha256_hex_fields(&[
        provider.as_bytes(),
        language.as_bytes(),
        requirement.as_bytes(),
    ]))
}
