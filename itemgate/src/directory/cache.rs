use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;

use super::KeyDirectory;
use crate::{
    clock::{Clock, System, UnixTime},
    error::KeyRetrievalFailed,
    jwks::SigningKeySet,
};

#[derive(Debug)]
struct CachedKeys {
    keys: SigningKeySet,
    fetched_at: UnixTime,
}

/// A key directory that reuses the last fetched key set for a bounded time
///
/// A key set is served from the cache until `ttl` has elapsed since it was
/// fetched. Failed fetches are never cached, and a zero `ttl` disables the
/// cache entirely.
#[derive(Debug)]
pub struct CachedKeyDirectory<D, C = System> {
    inner: D,
    ttl: Duration,
    clock: C,
    cached: ArcSwapOption<CachedKeys>,
}

impl<D> CachedKeyDirectory<D>
where
    D: KeyDirectory,
{
    /// Caches key sets fetched from `inner` for `ttl`
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            clock: System,
            cached: ArcSwapOption::empty(),
        }
    }
}

impl<D, C> CachedKeyDirectory<D, C> {
    /// Measures the age of cached key sets with the given clock
    pub fn with_clock<K>(self, clock: K) -> CachedKeyDirectory<D, K> {
        CachedKeyDirectory {
            inner: self.inner,
            ttl: self.ttl,
            clock,
            cached: self.cached,
        }
    }

    /// Discards the cached key set, if any
    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    /// The wrapped directory
    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D, C> KeyDirectory for CachedKeyDirectory<D, C>
where
    D: KeyDirectory,
    C: Clock + Send + Sync,
{
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        if self.ttl.is_zero() {
            return self.inner.fetch_keys().await;
        }

        if let Some(cached) = self.cached.load_full() {
            if self.clock.now() < cached.fetched_at.saturating_add(self.ttl) {
                tracing::trace!(fetched_at = %cached.fetched_at, "serving cached signing keys");
                return Ok(cached.keys.clone());
            }
        }

        let keys = self.inner.fetch_keys().await?;

        self.cached.store(Some(Arc::new(CachedKeys {
            keys: keys.clone(),
            fetched_at: self.clock.now(),
        })));

        Ok(keys)
    }
}
