//! Token expiry policy and HMAC-signed session tokens.
//!
//! ## Token Format
//!
//! - 1 byte: token kind (1 = access, 2 = refresh)
//! - 8 bytes: issue timestamp (Unix millis, big-endian)
//! - N bytes: subject (UTF-8)
//! - 32 bytes: HMAC-SHA256 signature over everything before it
//!
//! The whole token is URL-safe base64 without padding.
//!
//! Validation takes the [`TokenPolicy`] as an argument. Callers read the
//! current policy from a [`TokenPolicyHandle`] once per request, so one
//! validation always sees a single consistent policy.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const HEADER_LEN: usize = 9;
const SIGNATURE_LEN: usize = 32;

/// Current Unix time in milliseconds.
#[must_use]
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Which lifetime applies to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived token sent with every request.
    Access,
    /// Token exchanged for a new access token.
    Refresh,
}

impl TokenKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Access => 1,
            Self::Refresh => 2,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Access),
            2 => Some(Self::Refresh),
            _ => None,
        }
    }
}

/// Token lifetimes plus the revocation watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPolicy {
    /// Bumped on every change.
    pub version: u64,
    /// Lifetime of access tokens.
    #[serde(rename = "accessTokenExpiresSeconds", serialize_with = "as_secs")]
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens.
    #[serde(rename = "refreshTokenExpiresSeconds", serialize_with = "as_secs")]
    pub refresh_ttl: Duration,
    /// Tokens issued before this Unix-millis instant are rejected.
    pub issued_after: Option<u64>,
}

fn as_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

impl TokenPolicy {
    /// Creates the first policy version, without a watermark.
    #[must_use]
    pub const fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            version: 1,
            access_ttl,
            refresh_ttl,
            issued_after: None,
        }
    }

    /// Lifetime for the given kind.
    #[must_use]
    pub const fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

/// Shared, atomically swapped [`TokenPolicy`].
///
/// Readers get an `Arc` to whichever version was current when they asked;
/// an update never exposes a half-written policy.
#[derive(Debug)]
pub struct TokenPolicyHandle {
    current: RwLock<Arc<TokenPolicy>>,
}

impl TokenPolicyHandle {
    /// Creates a handle holding `policy`.
    #[must_use]
    pub fn new(policy: TokenPolicy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Returns the current policy.
    #[must_use]
    pub fn current(&self) -> Arc<TokenPolicy> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the lifetimes that are given and moves the watermark to
    /// `now_millis`, revoking every token issued earlier.
    pub fn update(
        &self,
        access_ttl: Option<Duration>,
        refresh_ttl: Option<Duration>,
        now_millis: u64,
    ) -> Arc<TokenPolicy> {
        let mut current = self.current.write();
        let next = Arc::new(TokenPolicy {
            version: current.version + 1,
            access_ttl: access_ttl.unwrap_or(current.access_ttl),
            refresh_ttl: refresh_ttl.unwrap_or(current.refresh_ttl),
            issued_after: Some(now_millis),
        });
        *current = Arc::clone(&next);
        next
    }
}

/// Claims carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Who the token was issued to.
    pub subject: String,
    /// Access or refresh.
    pub kind: TokenKind,
    /// Issue time, Unix millis.
    pub issued_at: u64,
}

/// Issues and validates HMAC-SHA256 signed tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Creates a signer with a shared secret.
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Issues a token for `subject` stamped with `now_millis`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing key is rejected.
    pub fn issue(&self, subject: &str, kind: TokenKind, now_millis: u64) -> CoreResult<String> {
        let mut data = Vec::with_capacity(HEADER_LEN + subject.len() + SIGNATURE_LEN);
        data.push(kind.tag());
        data.extend_from_slice(&now_millis.to_be_bytes());
        data.extend_from_slice(subject.as_bytes());

        let signature = self.mac(&data)?.finalize().into_bytes();
        data.extend_from_slice(&signature);

        Ok(URL_SAFE_NO_PAD.encode(data))
    }

    /// Validates a token against `policy` at `now_millis`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token is malformed, forged, of the
    /// wrong kind, expired, or issued before the policy's watermark.
    pub fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        policy: &TokenPolicy,
        now_millis: u64,
    ) -> CoreResult<TokenClaims> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CoreError::unauthorized("malformed token"))?;
        if raw.len() < HEADER_LEN + SIGNATURE_LEN {
            return Err(CoreError::unauthorized("malformed token"));
        }

        let (data, signature) = raw.split_at(raw.len() - SIGNATURE_LEN);
        self.mac(data)?
            .verify_slice(signature)
            .map_err(|_| CoreError::unauthorized("invalid signature"))?;

        let kind = TokenKind::from_tag(data[0])
            .ok_or_else(|| CoreError::unauthorized("unknown token kind"))?;
        if kind != expected {
            return Err(CoreError::unauthorized("wrong token kind"));
        }

        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&data[1..HEADER_LEN]);
        let issued_at = u64::from_be_bytes(stamp);

        if policy.issued_after.is_some_and(|after| issued_at < after) {
            return Err(CoreError::unauthorized("token revoked"));
        }
        let ttl = policy.ttl(kind).as_millis() as u64;
        if now_millis > issued_at.saturating_add(ttl) {
            return Err(CoreError::unauthorized("token expired"));
        }

        let subject = String::from_utf8(data[HEADER_LEN..].to_vec())
            .map_err(|_| CoreError::unauthorized("malformed token"))?;

        Ok(TokenClaims {
            subject,
            kind,
            issued_at,
        })
    }

    fn mac(&self, data: &[u8]) -> CoreResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CoreError::invalid_operation(format!("token key: {e}")))?;
        mac.update(data);
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}
