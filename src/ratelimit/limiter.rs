//! Core rate limiter implementation.
//!
//! The limiter runs a fixed-window counter per identity against a
//! [`CounterStore`]. A counter is created lazily on the first request of a
//! window, gets its expiry exactly once at creation, and is incremented
//! (expiry untouched) on every later allowed request until the store expires
//! it. Denied requests never touch the store.

use std::sync::Arc;
use tracing::{debug, trace};

use super::identity::Identity;
use super::policy::{Policy, PolicySet};
use super::store::{CounterStore, StoreError};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within its limit and has been counted
    Allow,
    /// The request is over its limit and was not counted
    Deny,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// The rate limiter that owns policy and drives a counter store.
///
/// Holds no per-request state; it can be shared across tasks behind an `Arc`.
pub struct RateLimiter {
    /// Backing store for counters
    store: Arc<dyn CounterStore>,
    /// Limits per identity kind
    policies: PolicySet,
}

impl RateLimiter {
    /// Create a new rate limiter over a store.
    pub fn new(store: Arc<dyn CounterStore>, policies: PolicySet) -> Self {
        Self { store, policies }
    }

    /// Check an identity against the policy for its kind.
    pub async fn check(&self, identity: &Identity) -> Result<Decision, StoreError> {
        let policy = *self.policies.for_kind(identity.kind());
        self.decide(identity, &policy).await
    }

    /// Decide whether a request from `identity` is admitted under `policy`.
    ///
    /// Store errors are returned as-is; the caller decides how to fail.
    pub async fn decide(&self, identity: &Identity, policy: &Policy) -> Result<Decision, StoreError> {
        let key = identity.counter_key();

        trace!(key = %key, limit = policy.limit, "Checking rate limit");

        // A zero limit admits nothing, including the request that would create the counter
        if policy.limit == 0 {
            debug!(key = %key, "Rate limit exceeded (limit is zero)");
            return Ok(Decision::Deny);
        }

        let count = self.store.get(&key).await?.unwrap_or(0);

        if count == 0 {
            self.store.increment(&key).await?;
            self.store.set_expiry(&key, policy.window).await?;
            debug!(
                key = %key,
                limit = policy.limit,
                window = ?policy.window,
                "Created rate limit counter"
            );
            return Ok(Decision::Allow);
        }

        if count >= policy.limit {
            debug!(
                key = %key,
                count = count,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            return Ok(Decision::Deny);
        }

        self.store.increment(&key).await?;
        Ok(Decision::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_secs(60);

    /// Store wrapper that counts mutating calls.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        increments: AtomicUsize,
        expiries: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
            self.inner.get(key).await
        }

        async fn increment(&self, key: &str) -> Result<u64, StoreError> {
            self.increments.fetch_add(1, Ordering::SeqCst);
            self.inner.increment(key).await
        }

        async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            self.expiries.fetch_add(1, Ordering::SeqCst);
            self.inner.set_expiry(key, ttl).await
        }
    }

    /// Store whose every operation fails.
    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store that reads fine but cannot write.
    #[derive(Default)]
    struct ReadOnlyStore;

    #[async_trait]
    impl CounterStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            Ok(None)
        }

        async fn increment(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::OperationFailed("READONLY".to_string()))
        }

        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn address(ip: &str) -> Identity {
        Identity::Address(ip.to_string())
    }

    fn create_limiter(store: Arc<dyn CounterStore>, credential: u64, addr: u64) -> RateLimiter {
        RateLimiter::new(store, PolicySet::new(credential, addr, WINDOW))
    }

    #[tokio::test]
    async fn test_first_request_creates_counter_with_expiry() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 10, 5);

        let decision = limiter.check(&address("192.168.1.1")).await.unwrap();

        assert_eq!(decision, Decision::Allow);
        assert_eq!(store.count("ip:192.168.1.1"), Some(1));
        assert!(store.ttl("ip:192.168.1.1").is_some());
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 10, 5);
        let identity = address("192.168.1.1");

        for i in 1..=5 {
            let decision = limiter.check(&identity).await.unwrap();
            assert!(decision.is_allowed(), "Request {} should be allowed", i);
        }
        assert_eq!(store.count("ip:192.168.1.1"), Some(5));

        for i in 6..=7 {
            let decision = limiter.check(&identity).await.unwrap();
            assert_eq!(decision, Decision::Deny, "Request {} should be denied", i);
        }
    }

    #[tokio::test]
    async fn test_denied_request_does_not_mutate_store() {
        let store = Arc::new(RecordingStore::default());
        let limiter = create_limiter(store.clone(), 10, 2);
        let identity = address("10.0.0.1");

        limiter.check(&identity).await.unwrap();
        limiter.check(&identity).await.unwrap();
        let increments = store.increments.load(Ordering::SeqCst);

        for _ in 0..3 {
            assert_eq!(limiter.check(&identity).await.unwrap(), Decision::Deny);
        }

        assert_eq!(store.increments.load(Ordering::SeqCst), increments);
        assert_eq!(store.inner.count("ip:10.0.0.1"), Some(2));
    }

    #[tokio::test]
    async fn test_expiry_set_once_per_window() {
        let store = Arc::new(RecordingStore::default());
        let limiter = create_limiter(store.clone(), 10, 5);
        let identity = address("10.0.0.1");

        for _ in 0..7 {
            limiter.check(&identity).await.unwrap();
        }

        assert_eq!(store.expiries.load(Ordering::SeqCst), 1);
        assert_eq!(store.increments.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increments_do_not_refresh_expiry() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 10, 5);
        let identity = address("10.0.0.1");

        limiter.check(&identity).await.unwrap();
        assert_eq!(store.ttl("ip:10.0.0.1"), Some(WINDOW));

        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.check(&identity).await.unwrap();
        limiter.check(&identity).await.unwrap();

        assert_eq!(store.ttl("ip:10.0.0.1"), Some(Duration::from_secs(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_resets_after_window() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(store.clone(), PolicySet::new(5, 5, Duration::from_secs(5)));
        let identity = address("192.168.1.1");

        for _ in 0..5 {
            assert!(limiter.check(&identity).await.unwrap().is_allowed());
        }
        assert_eq!(limiter.check(&identity).await.unwrap(), Decision::Deny);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(limiter.check(&identity).await.unwrap(), Decision::Allow);
        assert_eq!(store.count("ip:192.168.1.1"), Some(1));
    }

    #[tokio::test]
    async fn test_n_requests_within_limit_count_n() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 10, 5);
        let identity = Identity::Credential("mytoken".to_string());

        for n in 1..=10u64 {
            assert!(limiter.check(&identity).await.unwrap().is_allowed());
            assert_eq!(store.count("token:mytoken"), Some(n));
        }
    }

    #[tokio::test]
    async fn test_zero_limit_denies_first_request() {
        let store = Arc::new(RecordingStore::default());
        let limiter = create_limiter(store.clone(), 0, 0);

        let decision = limiter.check(&address("10.0.0.1")).await.unwrap();

        assert_eq!(decision, Decision::Deny);
        assert_eq!(store.increments.load(Ordering::SeqCst), 0);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_identity_kinds_use_their_own_policy() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 3, 1);

        let token = Identity::Credential("abc".to_string());
        for _ in 0..3 {
            assert!(limiter.check(&token).await.unwrap().is_allowed());
        }
        assert_eq!(limiter.check(&token).await.unwrap(), Decision::Deny);

        let ip = address("10.0.0.1");
        assert!(limiter.check(&ip).await.unwrap().is_allowed());
        assert_eq!(limiter.check(&ip).await.unwrap(), Decision::Deny);
    }

    #[tokio::test]
    async fn test_decide_with_explicit_policy() {
        let store = Arc::new(MemoryStore::new());
        let limiter = create_limiter(store.clone(), 100, 100);
        let identity = address("10.0.0.1");
        let strict = Policy::new(1, WINDOW);

        assert!(limiter.decide(&identity, &strict).await.unwrap().is_allowed());
        assert_eq!(limiter.decide(&identity, &strict).await.unwrap(), Decision::Deny);
    }

    #[tokio::test]
    async fn test_store_read_error_is_propagated() {
        let limiter = create_limiter(Arc::new(FailingStore), 10, 5);

        let result = limiter.check(&address("10.0.0.1")).await;

        assert_eq!(
            result,
            Err(StoreError::Unavailable("connection refused".to_string()))
        );
    }

    #[tokio::test]
    async fn test_store_write_error_is_propagated() {
        let limiter = create_limiter(Arc::new(ReadOnlyStore), 10, 5);

        let result = limiter.check(&address("10.0.0.1")).await;

        assert!(matches!(result, Err(StoreError::OperationFailed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_exceed_count_of_allowed() {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(create_limiter(store.clone(), 1000, 1000));

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check(&address("10.9.9.9")).await })
            })
            .collect();

        let mut allowed = 0;
        for result in futures::future::join_all(tasks).await {
            if result.unwrap().unwrap().is_allowed() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 200);
        assert_eq!(store.count("ip:10.9.9.9"), Some(200));
    }
}
