//! Credentials, session tokens and bearer-header parsing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{CrmError, CrmResult};

/// Random bytes behind a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;
/// Random bytes behind a quotation's public link token.
pub const PUBLIC_TOKEN_BYTES: usize = 24;

/// Turns a plaintext secret into a verifiable hash and back.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, secret: &str) -> CrmResult<String>;

    /// `Ok(false)` for a wrong secret; `Err` only for a malformed hash.
    fn verify(&self, hash: &str, secret: &str) -> CrmResult<bool>;
}

/// Argon2id with a random salt per hash.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Minimum-cost parameters. Hashes still verify with `new()`, since the
    /// parameters travel inside the PHC string.
    pub fn low_cost() -> CrmResult<Self> {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None)
            .map_err(|e| CrmError::Credential(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> CrmResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CrmError::Credential(format!("Failed to hash password: {e}")))?;
        Ok(hash.to_string())
    }

    fn verify(&self, hash: &str, secret: &str) -> CrmResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| CrmError::Credential(format!("Invalid password hash format: {e}")))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(CrmError::Credential(format!(
                "Password verification failed: {e}"
            ))),
        }
    }
}

/// URL-safe, unpadded base64 of `byte_len` random bytes.
pub fn new_token(byte_len: usize) -> String {
    let bytes: Vec<u8> = (0..byte_len).map(|_| rand::random::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Token from an `Authorization: Bearer <token>` header value. The scheme is
/// matched case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::low_cost().unwrap();
        let hash = hasher.hash("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "hunter2").unwrap());
        assert!(!hasher.verify(&hash, "hunter3").unwrap());

        // Parameters travel with the hash
        assert!(Argon2Hasher::new().verify(&hash, "hunter2").unwrap());
    }

    #[test]
    fn test_same_secret_gets_distinct_salts() {
        let hasher = Argon2Hasher::low_cost().unwrap();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let hasher = Argon2Hasher::low_cost().unwrap();
        assert!(hasher.verify("not-a-hash", "x").is_err());
    }

    #[test]
    fn test_token_length_and_alphabet() {
        let token = new_token(SESSION_TOKEN_BYTES);
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(new_token(PUBLIC_TOKEN_BYTES).len(), 32);
        assert_ne!(new_token(16), new_token(16));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc  "), Some("abc"));
        assert_eq!(bearer_token("BEARER abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
