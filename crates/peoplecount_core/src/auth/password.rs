//! Password hashing.
//!
//! Hashes are stored as `hmac-sha256$<salt>$<digest>` with both parts in
//! unpadded standard base64. The digest is HMAC-SHA256 keyed by a random
//! 16-byte salt over the UTF-8 password.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "hmac-sha256";
const SALT_LEN: usize = 16;

/// An opaque password hash.
///
/// Stored on user documents and in configuration; never rendered into a
/// view. `Debug` does not print the hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wraps an already-encoded hash string, e.g. one read from a flag.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Returns the encoded form.
    #[must_use]
    pub fn as_encoded(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Hashes and verifies user passwords.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a plaintext password with a fresh salt.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash cannot be computed.
    fn hash(&self, plain: &str) -> CoreResult<PasswordHash>;

    /// Checks a plaintext password against a stored hash.
    ///
    /// Malformed hashes never verify.
    fn verify(&self, plain: &str, hash: &PasswordHash) -> bool;
}

/// Salted HMAC-SHA256 password hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacPasswordHasher;

impl HmacPasswordHasher {
    /// Creates a hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn mac(salt: &[u8], plain: &str) -> CoreResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(salt)
            .map_err(|e| CoreError::invalid_operation(format!("password hash key: {e}")))?;
        mac.update(plain.as_bytes());
        Ok(mac)
    }
}

impl PasswordHasher for HmacPasswordHasher {
    fn hash(&self, plain: &str) -> CoreResult<PasswordHash> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::mac(&salt, plain)?.finalize().into_bytes();

        Ok(PasswordHash(format!(
            "{SCHEME}${}${}",
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(digest)
        )))
    }

    fn verify(&self, plain: &str, hash: &PasswordHash) -> bool {
        let mut parts = hash.0.split('$');
        let (Some(SCHEME), Some(salt), Some(digest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let (Ok(salt), Ok(digest)) = (
            STANDARD_NO_PAD.decode(salt),
            STANDARD_NO_PAD.decode(digest),
        ) else {
            return false;
        };

        Self::mac(&salt, plain)
            .map(|mac| mac.verify_slice(&digest).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = HmacPasswordHasher::new();
        let hash = hasher.hash("Secret123").unwrap();
        assert!(hash.as_encoded().starts_with("hmac-sha256$"));
        assert!(hasher.verify("Secret123", &hash));
        assert!(!hasher.verify("secret123", &hash));
    }

    #[test]
    fn salts_differ() {
        let hasher = HmacPasswordHasher::new();
        let a = hasher.hash("Secret123").unwrap();
        let b = hasher.hash("Secret123").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("Secret123", &b));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let hasher = HmacPasswordHasher::new();
        for encoded in ["", "plain", "hmac-sha256$$", "bcrypt$abc$def", "hmac-sha256$!!$??"] {
            assert!(!hasher.verify("anything", &PasswordHash::from_encoded(encoded)));
        }
    }

    #[test]
    fn debug_is_redacted() {
        let hash = HmacPasswordHasher::new().hash("Secret123").unwrap();
        assert_eq!(format!("{hash:?}"), "PasswordHash(<redacted>)");
    }
}
