use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt as _;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, System},
    config::{AuthorizerConfig, ConfigError},
    credential,
    decision::{AuthorizationDecision, PrincipalId},
    directory::KeyDirectory,
    error::{AuthorizeError, ClaimsRejected},
    jwa::{self, rsa},
    jwt::{BasicClaims, CoreClaims, CoreValidator, Validated},
};

/// The invocation payload delivered by the request router
///
/// Only `authorizationToken` is read. Its [`Debug`] output is redacted.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization_token: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method_arn: Option<String>,
}

impl AuthorizerEvent {
    /// An event carrying the given `Authorization` header value
    #[must_use]
    pub fn new(authorization_token: impl Into<String>) -> Self {
        Self {
            authorization_token: Some(authorization_token.into()),
            kind: Some("TOKEN".to_owned()),
            method_arn: None,
        }
    }

    /// The raw `Authorization` header value, if any
    #[must_use]
    pub fn authorization_token(&self) -> Option<&str> {
        self.authorization_token.as_deref()
    }

    /// The invoked method, if the router supplied it
    #[must_use]
    pub fn method_arn(&self) -> Option<&str> {
        self.method_arn.as_deref()
    }
}

impl fmt::Debug for AuthorizerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizerEvent")
            .field(
                "authorization_token",
                &self.authorization_token.as_ref().map(|_| "***"),
            )
            .field("type", &self.kind)
            .field("method_arn", &self.method_arn)
            .finish()
    }
}

/// Verifies bearer tokens against a key directory and issues decisions
///
/// Each call is independent. The authorizer holds no mutable state of its
/// own and can be shared between tasks behind an [`Arc`].
#[derive(Debug)]
pub struct Authorizer<D, C = System> {
    directory: D,
    validator: CoreValidator,
    clock: C,
}

impl<D> Authorizer<D>
where
    D: KeyDirectory,
{
    /// An authorizer accepting RS256 tokens signed by keys from `directory`
    ///
    /// No issuer, audience or subject checks are applied until a different
    /// validator is supplied with [`with_validator()`][Self::with_validator].
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            validator: CoreValidator::default().add_approved_algorithm(jwa::Algorithm::RS256),
            clock: System,
        }
    }
}

impl Authorizer<Arc<dyn KeyDirectory>> {
    /// Builds an authorizer from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &AuthorizerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.key_directory()?).with_validator(config.validator()?))
    }
}

impl<D, C> Authorizer<D, C> {
    /// Replaces the token validator
    pub fn with_validator(self, validator: CoreValidator) -> Self {
        Self { validator, ..self }
    }

    /// Evaluates token validity windows against the given clock
    pub fn with_clock<K>(self, clock: K) -> Authorizer<D, K> {
        Authorizer {
            directory: self.directory,
            validator: self.validator,
            clock,
        }
    }

    /// The key directory consulted on each call
    pub fn directory(&self) -> &D {
        &self.directory
    }
}

impl<D, C> Authorizer<D, C>
where
    D: KeyDirectory,
    C: Clock + Send + Sync,
{
    /// Produces a decision for one invocation
    ///
    /// This never fails. Every failure, including a panic while verifying,
    /// results in a Deny decision. The reason is logged, but never the
    /// token.
    #[tracing::instrument(skip_all, fields(method_arn = event.method_arn()))]
    pub async fn authorize(&self, event: &AuthorizerEvent) -> AuthorizationDecision {
        let outcome = match AssertUnwindSafe(self.authenticate(event.authorization_token()))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!("token verification panicked; caller not authorized");
                return AuthorizationDecision::deny();
            }
        };

        match &outcome {
            Ok(principal) => tracing::info!(%principal, "caller authorized"),
            Err(err) => {
                let error: &dyn std::error::Error = err;
                tracing::warn!(error, reason = err.reason(), "caller not authorized");
            }
        }

        AuthorizationDecision::from_outcome(outcome)
    }

    /// Verifies the bearer token in an `Authorization` header value
    ///
    /// The token is decoded before any key is fetched, so a malformed token
    /// never causes a request to the key directory.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered. See [`AuthorizeError`].
    pub async fn verify(
        &self,
        authorization: Option<&str>,
    ) -> Result<Validated<BasicClaims>, AuthorizeError> {
        let token = credential::extract_bearer(authorization)
            .ok_or(AuthorizeError::MissingOrMalformedCredential)?;

        let decomposed = token.decompose::<BasicClaims>()?;
        let header = decomposed.untrusted_header();
        let alg = header.alg();
        let kid = header
            .kid()
            .ok_or(AuthorizeError::NoMatchingKey)?
            .to_owned();

        let keys = self.directory.fetch_keys().await?;

        let Some(key) = keys.select(&kid) else {
            tracing::debug!(jwt.kid = %kid, jwt.alg = %alg, "unable to find matching key");
            return Err(AuthorizeError::NoMatchingKey);
        };

        let Some(certificate) = key.certificate() else {
            tracing::debug!(jwt.kid = %kid, "matching key publishes no certificate");
            return Err(AuthorizeError::NoMatchingKey);
        };

        let public_key = rsa::PublicKey::from_certificate_pem(&certificate)
            .map_err(|err| AuthorizeError::InvalidSignature(err.into()))?;

        let validated =
            decomposed.verify_with_clock(&public_key, &self.validator, &self.clock)?;

        if validated.claims().sub().is_none() {
            return Err(ClaimsRejected::MissingRequiredClaim("sub").into());
        }

        Ok(validated)
    }

    async fn authenticate(&self, authorization: Option<&str>) -> Result<PrincipalId, AuthorizeError> {
        let validated = self.verify(authorization).await?;

        validated
            .claims()
            .sub()
            .map(PrincipalId::from)
            .ok_or_else(|| ClaimsRejected::MissingRequiredClaim("sub").into())
    }
}
