//! Credential hashing and token policy.
//!
//! These are the seams towards the authentication layer: the core stores
//! password hashes and checks the super-user password, and the token
//! policy it owns is read by whoever validates session tokens.

mod password;
mod token;

pub use password::{HmacPasswordHasher, PasswordHash, PasswordHasher};
pub use token::{
    unix_millis, TokenClaims, TokenKind, TokenPolicy, TokenPolicyHandle, TokenSigner,
};
