//! # Credential Verification
//!
//! This module provides:
//! - Parsing of `my_<public20>.<secret>` system secrets
//! - Argon2id PHC verification against the stored hash
//! - Positive/negative result caching with separate TTLs

pub mod cache;
pub mod verifier;

pub use cache::AuthCache;
pub use verifier::{AuthError, AuthResult, CredentialVerifier, SystemIdentity};
