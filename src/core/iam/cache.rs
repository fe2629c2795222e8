//! LRU cache for trust evaluation decisions
//!
//! Keyed by policy fingerprint and the whole request value (principal, action
//! and every context key with its values), so a cached decision never outlives
//! a change to the policy it came from and two distinct requests never share
//! an entry.

use super::engine::{AssumeRoleRequest, Decision};
use lru::LruCache;
use std::num::NonZeroUsize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: String,
    request: AssumeRoleRequest,
}

/// LRU cache for evaluation decisions
pub struct PolicyCache {
    entries: LruCache<CacheKey, Decision>,
}

impl PolicyCache {
    /// Create a cache holding up to `capacity` decisions (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        PolicyCache {
            entries: LruCache::new(capacity),
        }
    }

    fn key(fingerprint: &str, request: &AssumeRoleRequest) -> CacheKey {
        CacheKey {
            fingerprint: fingerprint.to_string(),
            request: request.clone(),
        }
    }

    /// Decision previously stored for this policy and request
    pub fn lookup(&mut self, fingerprint: &str, request: &AssumeRoleRequest) -> Option<Decision> {
        self.entries.get(&Self::key(fingerprint, request)).copied()
    }

    pub fn store(&mut self, fingerprint: &str, request: &AssumeRoleRequest, decision: Decision) {
        self.entries.put(Self::key(fingerprint, request), decision);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
