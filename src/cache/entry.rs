//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with an absolute expiration.

use chrono::{DateTime, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and expiration instant.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key the entry is indexed under
    pub key: String,
    /// The stored value
    pub value: V,
    /// Instant (UTC) after which the entry is gone
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    pub fn new(key: impl Into<String>, value: V, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry whose expiration instant equals `now` is
    /// already expired. Only entries expiring strictly after `now` are live.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_entry_live_before_expiry() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", 1, now + TimeDelta::seconds(1));

        assert_eq!(entry.key, "k");
        assert!(!entry.is_expired(now));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", "v", now);

        assert!(entry.is_expired(now), "Entry should be expired at boundary");
        assert!(entry.is_expired(now + TimeDelta::milliseconds(1)));
    }
}
