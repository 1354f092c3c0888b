//! API token helpers.
//!
//! Tokens are handed to the user exactly once (at creation time); only the SHA-256 digest is
//! persisted. The REST layer hashes the presented bearer token and looks the digest up.

use sha2::{Digest, Sha256};

/// Prefix for every issued API token.
pub const TOKEN_PREFIX: &str = "hms_";

/// Generates a new random API token.
pub fn generate_api_token() -> String {
    format!(
        "{TOKEN_PREFIX}{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Returns the lowercase hex SHA-256 digest of `token`.
pub fn hash_api_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// Returns `None` if the scheme is not `Bearer` or the token is blank.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_prefixed_and_unique() {
        let a = generate_api_token();
        let b = generate_api_token();
        assert!(a.starts_with(TOKEN_PREFIX));
        assert_eq!(a.len(), TOKEN_PREFIX.len() + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_stable_hex_digest() {
        let hash = hash_api_token("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_token("secret"));
        assert_ne!(hash, hash_api_token("Secret"));
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer    "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
