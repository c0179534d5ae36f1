use std::{sync::Arc, time::Duration};

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{
    directory::{CachedKeyDirectory, KeyDirectory, RemoteKeyDirectory, DEFAULT_FETCH_TIMEOUT},
    jwa,
    jwt::{Audience, CoreValidator, Issuer},
};

/// An invalid authorizer configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The key directory URL could not be parsed
    #[error("invalid key directory URL")]
    InvalidJwksUrl(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The key directory URL uses a scheme other than `https`
    #[error("key directory URL must use https, got '{0}'")]
    InsecureJwksUrl(String),

    /// The key directory request timeout is zero
    #[error("key directory fetch timeout must be greater than zero")]
    ZeroFetchTimeout,

    /// The subject pattern is not a valid regular expression
    #[error("invalid subject pattern")]
    InvalidSubjectPattern(#[from] regex::Error),

    /// The HTTP client could not be initialized
    #[error("unable to initialize HTTP client")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration for an [`Authorizer`][crate::Authorizer]
///
/// Only the key directory URL is required. Every other setting has a
/// default: a 5 second fetch timeout, no key caching, no clock leeway, `exp`
/// checked only when present, and no issuer, audience or subject checks.
///
/// Durations are given in seconds and may be fractional.
///
/// ```
/// # use itemgate::AuthorizerConfig;
/// let config: AuthorizerConfig = serde_json::from_str(r#"{
///     "jwks_url": "https://tenant.example/.well-known/jwks.json",
///     "cache_ttl_secs": 300,
///     "fetch_timeout_secs": 1.5,
///     "audiences": ["items-api"]
/// }"#).unwrap();
///
/// assert_eq!(config.cache_ttl().as_secs(), 300);
/// assert_eq!(config.fetch_timeout().as_millis(), 1500);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct AuthorizerConfig {
    jwks_url: String,
    #[serde(
        rename = "fetch_timeout_secs",
        default = "default_fetch_timeout",
        with = "secs"
    )]
    fetch_timeout: Duration,
    #[serde(rename = "cache_ttl_secs", default, with = "secs")]
    cache_ttl: Duration,
    #[serde(rename = "leeway_secs", default, with = "secs")]
    leeway: Duration,
    #[serde(default)]
    require_expiration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    audiences: Vec<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject_pattern: Option<String>,
    #[serde(default)]
    allow_insecure_http: bool,
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

/// Durations as a number of seconds
mod secs {
    use super::*;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl AuthorizerConfig {
    /// A configuration fetching signing keys from `jwks_url`
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            fetch_timeout: default_fetch_timeout(),
            cache_ttl: Duration::ZERO,
            leeway: Duration::ZERO,
            require_expiration: false,
            issuer: None,
            audiences: Vec::new(),
            subject_pattern: None,
            allow_insecure_http: false,
        }
    }

    /// Bounds each key directory request; must be greater than zero
    pub fn with_fetch_timeout(self, fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout,
            ..self
        }
    }

    /// Reuses a fetched key set for up to `ttl`; zero disables caching
    pub fn with_cache_ttl(self, cache_ttl: Duration) -> Self {
        Self { cache_ttl, ..self }
    }

    /// Allows a grace period on either side of the `nbf` and `exp` claims
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Rejects tokens that carry no `exp` claim
    pub fn require_expiration(self) -> Self {
        Self {
            require_expiration: true,
            ..self
        }
    }

    /// Requires tokens to carry this `iss` claim
    pub fn with_issuer(self, issuer: impl Into<Issuer>) -> Self {
        Self {
            issuer: Some(issuer.into()),
            ..self
        }
    }

    /// Accepts tokens issued for this audience
    ///
    /// Once any audience is configured, a token's `aud` claim must contain
    /// at least one configured audience.
    pub fn with_audience(mut self, audience: impl Into<Audience>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Requires the `sub` claim to match a regular expression
    pub fn with_subject_pattern(self, pattern: impl Into<String>) -> Self {
        Self {
            subject_pattern: Some(pattern.into()),
            ..self
        }
    }

    /// Permits a plain `http` key directory URL
    ///
    /// Signing keys fetched over plain HTTP can be replaced in transit. Only
    /// use this against a directory on a trusted local network.
    pub fn allow_insecure_http(self) -> Self {
        Self {
            allow_insecure_http: true,
            ..self
        }
    }

    /// The key directory URL
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// The bound on each key directory request
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// How long a fetched key set is reused
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Parses the key directory URL and checks its scheme
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse, or if it does not use
    /// `https` and plain `http` has not been permitted.
    pub fn validated_jwks_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.jwks_url).map_err(|err| ConfigError::InvalidJwksUrl(err.into()))?;

        match url.scheme() {
            "https" => Ok(url),
            "http" if self.allow_insecure_http => Ok(url),
            other => Err(ConfigError::InsecureJwksUrl(other.to_owned())),
        }
    }

    /// Builds the token validator described by this configuration
    ///
    /// Only RS256 is approved.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject pattern is not a valid regular
    /// expression.
    pub fn validator(&self) -> Result<CoreValidator, ConfigError> {
        let mut validator = CoreValidator::default()
            .add_approved_algorithm(jwa::Algorithm::RS256)
            .with_leeway(self.leeway)
            .extend_allowed_audiences(self.audiences.iter().cloned());

        if self.require_expiration {
            validator = validator.require_expiration();
        }

        if let Some(issuer) = &self.issuer {
            validator = validator.require_issuer(issuer.clone());
        }

        if let Some(pattern) = &self.subject_pattern {
            validator = validator.check_subject(Regex::new(pattern)?);
        }

        Ok(validator)
    }

    /// Builds the key directory described by this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the fetch timeout is zero, or
    /// the HTTP client cannot be initialized.
    pub fn key_directory(&self) -> Result<Arc<dyn KeyDirectory>, ConfigError> {
        let url = self.validated_jwks_url()?;
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }

        let remote = RemoteKeyDirectory::new(url.as_str(), self.fetch_timeout())?;

        let ttl = self.cache_ttl();
        if ttl.is_zero() {
            Ok(Arc::new(remote))
        } else {
            Ok(Arc::new(CachedKeyDirectory::new(remote, ttl)))
        }
    }
}
