use async_trait::async_trait;

use super::KeyDirectory;
use crate::{error::KeyRetrievalFailed, jwks::SigningKeySet};

/// A key directory that always serves the same key set
#[derive(Clone, Debug, Default)]
pub struct StaticKeyDirectory {
    keys: SigningKeySet,
}

impl StaticKeyDirectory {
    /// Serves `keys` on every fetch
    #[must_use]
    pub fn new(keys: SigningKeySet) -> Self {
        Self { keys }
    }

    /// The served key set
    #[must_use]
    pub fn keys(&self) -> &SigningKeySet {
        &self.keys
    }
}

impl From<SigningKeySet> for StaticKeyDirectory {
    fn from(keys: SigningKeySet) -> Self {
        Self::new(keys)
    }
}

#[async_trait]
impl KeyDirectory for StaticKeyDirectory {
    async fn fetch_keys(&self) -> Result<SigningKeySet, KeyRetrievalFailed> {
        Ok(self.keys.clone())
    }
}
