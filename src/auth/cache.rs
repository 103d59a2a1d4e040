//! Verification result cache
//!
//! Two caches with independent TTLs: successful verifications are reusable
//! for minutes, while denials expire quickly so a rotated credential or a
//! flood of bad guesses cannot poison a system's entry for long.

use moka::future::Cache;
use std::time::Duration;

use super::verifier::SystemIdentity;

/// Cached negative outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeOutcome {
    /// Unknown key or secret mismatch
    Denied,
    /// System exists but is soft-deleted
    Deleted,
}

/// Credential verification cache
pub struct AuthCache {
    positive: Cache<String, SystemIdentity>,
    negative: Cache<String, NegativeOutcome>,
}

impl AuthCache {
    /// Create a cache with the given positive and negative TTLs
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            positive: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(positive_ttl)
                .build(),
            negative: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(negative_ttl)
                .build(),
        }
    }

    /// Cached successful verification for a credential fingerprint
    pub async fn get_positive(&self, key: &str) -> Option<SystemIdentity> {
        self.positive.get(key).await
    }

    /// Cached denial for a credential fingerprint
    pub async fn get_negative(&self, key: &str) -> Option<NegativeOutcome> {
        self.negative.get(key).await
    }

    /// Store a successful verification
    pub async fn put_positive(&self, key: String, identity: SystemIdentity) {
        self.negative.invalidate(&key).await;
        self.positive.insert(key, identity).await;
    }

    /// Store a denial
    pub async fn put_negative(&self, key: String, outcome: NegativeOutcome) {
        self.positive.invalidate(&key).await;
        self.negative.insert(key, outcome).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity() -> SystemIdentity {
        SystemIdentity {
            system_id: Uuid::new_v4(),
            system_key: "sys-1".to_string(),
            organization_id: Some("org-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_positive_hit() {
        let cache = AuthCache::new(Duration::from_secs(300), Duration::from_secs(30));
        cache.put_positive("k1".to_string(), identity()).await;

        let hit = cache.get_positive("k1").await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().system_key, "sys-1");
        assert!(cache.get_negative("k1").await.is_none());
    }

    #[tokio::test]
    async fn test_negative_replaced_by_positive() {
        let cache = AuthCache::new(Duration::from_secs(300), Duration::from_secs(30));
        cache
            .put_negative("k1".to_string(), NegativeOutcome::Denied)
            .await;
        assert_eq!(
            cache.get_negative("k1").await,
            Some(NegativeOutcome::Denied)
        );

        cache.put_positive("k1".to_string(), identity()).await;
        assert!(cache.get_negative("k1").await.is_none());
        assert!(cache.get_positive("k1").await.is_some());
    }

    #[tokio::test]
    async fn test_negative_ttl_expiry() {
        let cache = AuthCache::new(Duration::from_secs(300), Duration::from_millis(10));
        cache
            .put_negative("k1".to_string(), NegativeOutcome::Deleted)
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get_negative("k1").await.is_none());
    }
}
