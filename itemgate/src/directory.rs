//! Sources of the identity provider's signing keys

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::KeyRetrievalFailed, jwks::SigningKeySet};

mod cache;
mod local;
mod remote;

pub use cache::CachedKeyDirectory;
pub use local::StaticKeyDirectory;
pub use remote::{RemoteKeyDirectory, DEFAULT_FETCH_TIMEOUT};

/// A source of signing keys
///
/// Implementations make a single attempt per call and do not retry.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Retrieves the current signing key set
    ///
    /// # Errors
    ///
    /// Returns an error if the key set could not be retrieved or decoded.
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed>;
}

#[async_trait]
impl<'a, T> KeyDirectory for &'a T
where
    T: KeyDirectory + ?Sized,
{
    #[inline]
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        T::fetch_keys(self).await
    }
}

#[async_trait]
impl<T> KeyDirectory for Box<T>
where
    T: KeyDirectory + ?Sized,
{
    #[inline]
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        T::fetch_keys(self).await
    }
}

#[async_trait]
impl<T> KeyDirectory for Arc<T>
where
    T: KeyDirectory + ?Sized,
{
    #[inline]
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        T::fetch_keys(self).await
    }
}
