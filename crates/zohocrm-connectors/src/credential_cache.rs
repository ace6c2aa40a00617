//! Short-lived credential cache with single-flight refresh

use crate::broker::CredentialSource;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use zohocrm_core::{AccessCredential, ConnectionRef, CrmResult};

/// Entries stop being served this long before the broker-reported expiry
pub const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// What the CRM adapter asks for a credential
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, connection: &ConnectionRef) -> CrmResult<AccessCredential>;

    /// Drop `stale` after the CRM rejected it. A no-op when the cache already
    /// holds a different credential.
    async fn invalidate(&self, connection: &ConnectionRef, stale: &AccessCredential);
}

#[derive(Debug, Clone)]
struct CachedCredential {
    credential: AccessCredential,
    valid_until: Instant,
}

/// Last credential fetched under a refresh lock, shared with callers that
/// were already waiting on that lock when it arrived
#[derive(Debug, Clone)]
struct Handoff {
    credential: AccessCredential,
    fetched_at: Instant,
}

type RefreshSlot = Arc<Mutex<Option<Handoff>>>;

/// Caches one credential per connection. Concurrent callers that miss the
/// cache share a single broker call.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    ttl: Duration,
    entries: RwLock<HashMap<ConnectionRef, CachedCredential>>,
    refresh_locks: Mutex<HashMap<ConnectionRef, RefreshSlot>>,
}

impl CredentialCache {
    /// A zero `ttl` disables caching: every resolve goes to the source
    pub fn new(source: Arc<dyn CredentialSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entries: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    async fn lookup(&self, connection: &ConnectionRef) -> Option<AccessCredential> {
        let entries = self.entries.read().await;
        entries
            .get(connection)
            .filter(|entry| entry.valid_until > Instant::now())
            .map(|entry| entry.credential.clone())
    }

    async fn refresh_lock(&self, connection: &ConnectionRef) -> RefreshSlot {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(connection.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// How long a fresh credential may be served, if at all
    fn lifetime(&self, credential: &AccessCredential) -> Option<Duration> {
        let Some(expires_at) = credential.expires_at else {
            return Some(self.ttl);
        };
        let remaining = (expires_at - Utc::now()).to_std().ok()?;
        let usable = remaining.checked_sub(EXPIRY_SKEW)?;
        if usable.is_zero() {
            None
        } else {
            Some(usable.min(self.ttl))
        }
    }

    async fn store(&self, connection: &ConnectionRef, credential: &AccessCredential) {
        match self.lifetime(credential) {
            Some(lifetime) => {
                let mut entries = self.entries.write().await;
                entries.insert(
                    connection.clone(),
                    CachedCredential {
                        credential: credential.clone(),
                        valid_until: Instant::now() + lifetime,
                    },
                );
                debug!(connection = %connection, ttl_secs = lifetime.as_secs(), "Cached credential");
            }
            None => {
                debug!(connection = %connection, "Credential too close to expiry to cache");
            }
        }
    }
}

#[async_trait]
impl CredentialProvider for CredentialCache {
    async fn resolve(&self, connection: &ConnectionRef) -> CrmResult<AccessCredential> {
        if !self.is_enabled() {
            return self.source.fetch_credential(connection).await;
        }

        if let Some(credential) = self.lookup(connection).await {
            return Ok(credential);
        }

        let waiting_since = Instant::now();
        let lock = self.refresh_lock(connection).await;
        let mut slot = lock.lock().await;

        // Double-check: another caller may have refreshed while we waited
        if let Some(credential) = self.lookup(connection).await {
            return Ok(credential);
        }
        // Covers credentials too close to expiry to be cached
        if let Some(handoff) = slot.as_ref().filter(|h| h.fetched_at > waiting_since) {
            return Ok(handoff.credential.clone());
        }

        let credential = self.source.fetch_credential(connection).await?;
        self.store(connection, &credential).await;
        *slot = Some(Handoff {
            credential: credential.clone(),
            fetched_at: Instant::now(),
        });
        Ok(credential)
    }

    async fn invalidate(&self, connection: &ConnectionRef, stale: &AccessCredential) {
        let mut entries = self.entries.write().await;
        let holds_stale = entries
            .get(connection)
            .map(|entry| entry.credential.token == stale.token)
            .unwrap_or(false);
        if holds_stale {
            entries.remove(connection);
            debug!(connection = %connection, "Invalidated cached credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zohocrm_core::{CrmError, Region, SecretToken};

    /// Hands out token-1, token-2, ... after a short delay
    struct CountingSource {
        calls: AtomicUsize,
        expires_in: Option<ChronoDuration>,
    }

    impl CountingSource {
        fn new(expires_in: Option<ChronoDuration>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expires_in,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn fetch_credential(&self, _connection: &ConnectionRef) -> CrmResult<AccessCredential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(AccessCredential::new(
                SecretToken::new(format!("token-{}", n)),
                Region::Us,
                self.expires_in.map(|d| Utc::now() + d),
            ))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl CredentialSource for FailingSource {
        async fn fetch_credential(&self, connection: &ConnectionRef) -> CrmResult<AccessCredential> {
            Err(CrmError::ConnectionNotFound(connection.to_string()))
        }
    }

    fn connection() -> ConnectionRef {
        ConnectionRef::new("conn-1", "zoho-crm")
    }

    #[tokio::test]
    async fn test_single_flight_refresh() {
        let source = CountingSource::new(None);
        let cache = Arc::new(CredentialCache::new(source.clone(), Duration::from_secs(300)));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(&connection()).await })
            })
            .collect();

        for task in tasks {
            let credential = task.await.unwrap().unwrap();
            assert_eq!(credential.token.expose(), "token-1");
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_only_matching_token() {
        let source = CountingSource::new(None);
        let cache = CredentialCache::new(source.clone(), Duration::from_secs(300));
        let conn = connection();

        let first = cache.resolve(&conn).await.unwrap();
        cache.invalidate(&conn, &first).await;
        let second = cache.resolve(&conn).await.unwrap();
        assert_eq!(second.token.expose(), "token-2");

        // A late invalidation for the old token leaves the new one in place
        cache.invalidate(&conn, &first).await;
        let third = cache.resolve(&conn).await.unwrap();
        assert_eq!(third.token.expose(), "token-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let source = CountingSource::new(None);
        let cache = CredentialCache::new(source.clone(), Duration::ZERO);
        cache.resolve(&connection()).await.unwrap();
        cache.resolve(&connection()).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_near_expiry_credentials_are_not_cached() {
        let source = CountingSource::new(Some(ChronoDuration::seconds(30)));
        let cache = CredentialCache::new(source.clone(), Duration::from_secs(300));
        cache.resolve(&connection()).await.unwrap();
        cache.resolve(&connection()).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_near_expiry_refresh_is_shared_by_waiters() {
        let source = CountingSource::new(Some(ChronoDuration::seconds(30)));
        let cache = Arc::new(CredentialCache::new(source.clone(), Duration::from_secs(300)));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(&connection()).await })
            })
            .collect();

        for task in tasks {
            let credential = task.await.unwrap().unwrap();
            assert_eq!(credential.token.expose(), "token-1");
        }
        assert_eq!(source.calls(), 1);
        assert!(cache.entries.read().await.is_empty());

        // Later callers still go back to the broker
        let later = cache.resolve(&connection()).await.unwrap();
        assert_eq!(later.token.expose(), "token-2");
    }

    #[tokio::test]
    async fn test_lifetime_bounded_by_expiry() {
        let source = CountingSource::new(None);
        let cache = CredentialCache::new(source, Duration::from_secs(300));
        let credential = AccessCredential::new(
            SecretToken::new("t"),
            Region::Eu,
            Some(Utc::now() + ChronoDuration::seconds(160)),
        );
        let lifetime = cache.lifetime(&credential).unwrap();
        assert!(lifetime <= Duration::from_secs(100));
        assert!(lifetime > Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = CredentialCache::new(Arc::new(FailingSource), Duration::from_secs(300));
        let err = cache.resolve(&connection()).await.unwrap_err();
        assert_eq!(err.kind(), "ConnectionNotFound");
        assert!(cache.entries.read().await.is_empty());
    }
}
