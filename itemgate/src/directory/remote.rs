use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::KeyDirectory;
use crate::{
    error::{self, KeyRetrievalFailed},
    jwks::SigningKeySet,
};

/// The request timeout used when none is configured
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A key directory served over HTTP(S)
///
/// Every call to [`fetch_keys()`][KeyDirectory::fetch_keys] issues one GET
/// request. Wrap the directory in a
/// [`CachedKeyDirectory`][super::CachedKeyDirectory] to reuse a key set
/// between calls.
#[derive(Clone, Debug)]
pub struct RemoteKeyDirectory {
    client: Client,
    url: String,
}

impl RemoteKeyDirectory {
    /// Constructs a directory with its own HTTP client
    ///
    /// The timeout bounds both connection establishment and the whole
    /// request, including reading the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("itemgate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self::with_client(client, url))
    }

    /// Constructs a directory using an existing HTTP client
    ///
    /// The client's own timeout settings apply.
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The URL the key set is fetched from
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeyDirectory for RemoteKeyDirectory {
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        tracing::Span::current().record("jwks.url", self.url.as_str());
        tracing::debug!("fetching signing keys");

        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, timeout = err.is_timeout(), "signing key request failed");
                return Err(error::key_retrieval_failed(err));
            }
        };

        if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "signing key request failed; unexpected response status",
            );
            return Err(error::key_retrieval_failed(err));
        }

        match response.json::<SigningKeySet>().await {
            Ok(keys) => {
                tracing::debug!(jwks.len = keys.len(), "signing keys fetched");
                Ok(keys)
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "signing key request failed; unreadable key set");
                Err(error::key_retrieval_failed(err))
            }
        }
    }
}
