use nanoid::nanoid;
use sha2::{Digest, Sha256};

pub const API_KEY_PREFIX: &str = "nh_live_";
pub const SESSION_TOKEN_PREFIX: &str = "pay_";

/// Returns `(raw, hash, display_prefix)`. Only the hash is persisted.
pub fn generate_api_key(prefix: &str) -> (String, String, String) {
    let raw = format!("{}{}", prefix, nanoid!(24));
    let hash = hash_api_key(&raw);
    let key_prefix = raw.chars().take(12).collect::<String>();
    (raw, hash, key_prefix)
}

pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque token for a public payment link. nanoid draws from the OS-seeded
/// CSPRNG, 36 symbols of a 64-symbol alphabet give 216 bits.
pub fn generate_session_token() -> String {
    format!("{}{}", SESSION_TOKEN_PREFIX, nanoid!(36))
}

/// Constant-time comparison for shared secrets carried in callback URLs.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key() {
        let (raw, hash, prefix) = generate_api_key(API_KEY_PREFIX);

        assert!(raw.starts_with("nh_live_"), "key should start with api key prefix");
        assert_eq!(raw.len(), 8 + 24, "key should be prefix(8) + nanoid(24)");
        assert_eq!(prefix.len(), 12, "prefix should be 12 chars");
        assert!(raw.starts_with(&prefix), "raw key should start with stored prefix");
        assert_eq!(hash.len(), 64, "SHA256 hash should be 64 hex chars");
        assert_eq!(hash, hash_api_key(&raw));
    }

    #[test]
    fn test_hash_api_key_deterministic() {
        let key = "nh_live_test123456789012345678";
        assert_eq!(hash_api_key(key), hash_api_key(key));
    }

    #[test]
    fn test_hash_api_key_different_inputs() {
        assert_ne!(hash_api_key("key_a"), hash_api_key("key_b"));
    }

    #[test]
    fn test_api_key_uniqueness() {
        let (key1, _, _) = generate_api_key(API_KEY_PREFIX);
        let (key2, _, _) = generate_api_key(API_KEY_PREFIX);
        assert_ne!(key1, key2, "generated keys should be unique");
    }

    #[test]
    fn test_session_token_shape() {
        let token = generate_session_token();
        assert!(token.starts_with("pay_"));
        assert_eq!(token.len(), 4 + 36);
    }

    #[test]
    fn test_session_tokens_unique() {
        let tokens: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_session_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("cb_secret", "cb_secret"));
        assert!(!secrets_match("cb_secret", "cb_secreT"));
        assert!(!secrets_match("cb_secret", "cb"));
    }
}
