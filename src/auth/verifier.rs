//! System credential verification
//!
//! Secrets have the shape `my_<public20>.<rest>`: the 20-hex public part is
//! an indexed lookup key, the remainder is verified against a stored Argon2id
//! PHC hash. Hash parameters live inside the PHC string.

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::cache::{AuthCache, NegativeOutcome};
use crate::config::AuthSettings;
use crate::db::Database;

/// Verification errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed credential")]
    BadFormat,

    #[error("Invalid credentials")]
    Denied,

    #[error("System has been deleted")]
    Deleted,

    #[error("Verification dependency unavailable: {0}")]
    Unavailable(String),
}

/// Result type for verification
pub type AuthResult<T> = Result<T, AuthError>;

/// The authenticated system behind a verified credential
#[derive(Debug, Clone)]
pub struct SystemIdentity {
    /// Internal system identifier
    pub system_id: Uuid,

    /// External system label
    pub system_key: String,

    /// Owning organization
    pub organization_id: Option<String>,
}

/// Parsed form of a presented secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSecret {
    /// 20-hex lookup prefix
    pub public: String,

    /// Remainder verified against the stored hash
    pub rest: String,
}

/// Parse `my_<public20>.<rest>`, rejecting anything malformed
pub fn parse_secret(secret: &str, min_length: usize) -> AuthResult<ParsedSecret> {
    if secret.len() < min_length {
        return Err(AuthError::BadFormat);
    }

    let without_prefix = secret.strip_prefix("my_").ok_or(AuthError::BadFormat)?;
    let (public, rest) = without_prefix.split_once('.').ok_or(AuthError::BadFormat)?;

    if public.len() != 20 || !public.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AuthError::BadFormat);
    }
    if rest.is_empty() {
        return Err(AuthError::BadFormat);
    }

    Ok(ParsedSecret {
        public: public.to_string(),
        rest: rest.to_string(),
    })
}

/// Credential verifier with result caching
pub struct CredentialVerifier {
    db: Database,
    cache: AuthCache,
    settings: AuthSettings,
}

impl CredentialVerifier {
    /// Create a verifier over the given database
    pub fn new(db: Database, settings: AuthSettings) -> Arc<Self> {
        let cache = AuthCache::new(settings.cache_ttl, settings.negative_cache_ttl);
        Arc::new(Self {
            db,
            cache,
            settings,
        })
    }

    /// Verify a Basic credential pair.
    ///
    /// Cache entries are keyed by the system key together with a digest of
    /// the presented secret, so a hit can never authenticate a different
    /// password than the one that produced it.
    pub async fn verify(&self, system_key: &str, secret: &str) -> AuthResult<SystemIdentity> {
        let parsed = parse_secret(secret, self.settings.secret_min_length)?;
        let cache_key = cache_key(system_key, secret);

        if let Some(identity) = self.cache.get_positive(&cache_key).await {
            return Ok(identity);
        }
        if let Some(outcome) = self.cache.get_negative(&cache_key).await {
            return Err(match outcome {
                NegativeOutcome::Denied => AuthError::Denied,
                NegativeOutcome::Deleted => AuthError::Deleted,
            });
        }

        let system = self
            .db
            .find_system_for_auth(system_key, &parsed.public)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let system = match system {
            Some(system) => system,
            None => {
                self.cache
                    .put_negative(cache_key, NegativeOutcome::Denied)
                    .await;
                return Err(AuthError::Denied);
            }
        };

        if system.is_deleted() {
            self.cache
                .put_negative(cache_key, NegativeOutcome::Deleted)
                .await;
            return Err(AuthError::Deleted);
        }

        let hash =
            PasswordHash::new(&system.system_secret_hash).map_err(|_| AuthError::Denied)?;
        if Argon2::default()
            .verify_password(parsed.rest.as_bytes(), &hash)
            .is_err()
        {
            self.cache
                .put_negative(cache_key, NegativeOutcome::Denied)
                .await;
            return Err(AuthError::Denied);
        }

        let identity = SystemIdentity {
            system_id: system.system_id,
            system_key: system.system_key.clone(),
            organization_id: system.organization_id.clone(),
        };
        self.cache
            .put_positive(cache_key, identity.clone())
            .await;

        Ok(identity)
    }
}

/// Cache key binding the system key to the presented secret
fn cache_key(system_key: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{}:{}", system_key, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::PasswordHasher;

    #[test]
    fn test_parse_valid_secret() {
        let secret = "my_0123456789abcdef0123.the-rest-of-the-secret";
        let parsed = parse_secret(secret, 32).unwrap();
        assert_eq!(parsed.public, "0123456789abcdef0123");
        assert_eq!(parsed.rest, "the-rest-of-the-secret");
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let err = parse_secret("mx_0123456789abcdef0123.rest-rest-rest-rest", 32).unwrap_err();
        assert!(matches!(err, AuthError::BadFormat));
    }

    #[test]
    fn test_parse_rejects_missing_dot() {
        let err = parse_secret("my_0123456789abcdef0123rest-rest-rest-rest!", 32).unwrap_err();
        assert!(matches!(err, AuthError::BadFormat));
    }

    #[test]
    fn test_parse_rejects_short_or_nonhex_public() {
        assert!(parse_secret("my_0123456789abcdef.rest-rest-rest-rest-rest", 32).is_err());
        assert!(parse_secret("my_0123456789abcdefghij.rest-rest-rest-rest", 32).is_err());
    }

    #[test]
    fn test_parse_rejects_short_secret() {
        assert!(parse_secret("my_0123456789abcdef0123.x", 32).is_err());
    }

    #[test]
    fn test_phc_verification_matches_and_rejects() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"correct-horse-battery", &salt)
            .unwrap()
            .to_string();

        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct-horse-battery", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"correct-horse-batterz", &parsed)
            .is_err());
    }

    #[test]
    fn test_cache_key_binds_secret() {
        let a = cache_key("sys-1", "my_0123456789abcdef0123.aaaa");
        let b = cache_key("sys-1", "my_0123456789abcdef0123.aaab");
        assert_ne!(a, b);
    }
}
