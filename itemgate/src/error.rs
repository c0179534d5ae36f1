//! Failure conditions of the authorization pipeline
//!
//! The fine-grained types in this module exist for diagnostics only. At the
//! edge, every one of them collapses into the same Deny decision.

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use thiserror::Error;

use crate::jwa;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The key directory could not produce a signing key set
///
/// Covers network failures, timeouts, non-success statuses and bodies that
/// are not a valid key set alike.
#[derive(Debug, Error)]
#[error("key retrieval failed")]
pub struct KeyRetrievalFailed {
    #[source]
    source: BoxError,
}

impl KeyRetrievalFailed {
    /// Wraps the cause of a failed retrieval
    ///
    /// For use by [`KeyDirectory`][crate::KeyDirectory] implementations
    /// outside this crate.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

pub(crate) fn key_retrieval_failed(source: impl Into<BoxError>) -> KeyRetrievalFailed {
    KeyRetrievalFailed::new(source)
}

/// The key cannot be used with the requested algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key incompatible with algorithm '{alg}'")]
pub struct IncompatibleAlgorithm {
    alg: jwa::Algorithm,
}

pub(crate) const fn incompatible_algorithm(alg: jwa::Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The JWT is malformed and cannot be split into header, payload, and signature sections
#[derive(Clone, Copy, Debug, Error)]
#[error("malformed JWT")]
pub struct MalformedJwt {
    _p: (),
}

pub(crate) const fn malformed_jwt() -> MalformedJwt {
    MalformedJwt { _p: () }
}

/// The JWT header section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT header")]
pub struct MalformedJwtHeader {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_jwt_header(source: impl Into<BoxError>) -> MalformedJwtHeader {
    MalformedJwtHeader {
        source: source.into(),
    }
}

/// The JWT payload section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT payload")]
pub struct MalformedJwtPayload {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_jwt_payload(source: impl Into<BoxError>) -> MalformedJwtPayload {
    MalformedJwtPayload {
        source: source.into(),
    }
}

/// The JWT signature section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT signature")]
pub struct MalformedJwtSignature {
    #[from]
    source: BoxError,
}

pub(crate) fn malformed_jwt_signature(source: impl Into<BoxError>) -> MalformedJwtSignature {
    MalformedJwtSignature {
        source: source.into(),
    }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The certificate or the public key inside it was rejected
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: BoxError,
}

pub(crate) fn key_rejected(source: impl Into<BoxError>) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// An error occurring while verifying a signature with a public key
#[derive(Debug, Error)]
pub enum KeyVerifyError {
    /// The key does not support the algorithm named by the token
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// Signature is invalid
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

/// An error occurring when validating the claims of a JWT
#[derive(Debug, Error)]
pub enum ClaimsRejected {
    /// The token algorithm is not approved
    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// The token audience is not acceptable
    #[error("invalid audience")]
    InvalidAudience,

    /// The token issuer is not acceptable
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The token subject is not acceptable
    #[error("invalid subject")]
    InvalidSubject,

    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// A required claim is missing
    #[error("required {0} claim missing")]
    MissingRequiredClaim(&'static str),
}

/// An error occurring while verifying a JWT
#[derive(Debug, Error)]
pub enum JwtVerifyError {
    /// The JWT is malformed, without a discernible header, payload, and signature
    #[error(transparent)]
    MalformedToken(#[from] MalformedJwt),

    /// The JWT header is malformed
    #[error(transparent)]
    MalformedTokenHeader(#[from] MalformedJwtHeader),

    /// The JWT payload is malformed
    #[error(transparent)]
    MalformedTokenPayload(#[from] MalformedJwtPayload),

    /// The JWT signature is malformed
    #[error(transparent)]
    MalformedTokenSignature(#[from] MalformedJwtSignature),

    /// The certificate named by the token could not be used
    #[error("signing certificate rejected")]
    KeyRejected(#[from] KeyRejected),

    /// The JWT was rejected by the public key
    #[error("token rejected by key")]
    KeyVerifyError(#[from] KeyVerifyError),

    /// The JWT was rejected by the claims validator
    #[error("token rejected by claims validator")]
    ClaimsRejected(#[from] ClaimsRejected),
}

impl JwtVerifyError {
    /// Whether the token failed structural decoding
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::MalformedTokenHeader(_)
                | Self::MalformedTokenPayload(_)
                | Self::MalformedTokenSignature(_)
        )
    }
}

/// Why an authorization attempt was turned into a Deny decision
///
/// Each variant corresponds to one kind of failure. None of this detail is
/// exposed to callers of [`Authorizer::authorize()`][crate::Authorizer::authorize];
/// it is only logged.
#[derive(Debug, Error)]
pub enum AuthorizeError {
    /// The `Authorization` header was missing, did not use the `Bearer`
    /// scheme, or carried an empty token
    #[error("missing or malformed authorization header")]
    MissingOrMalformedCredential,

    /// The signing keys could not be retrieved from the key directory
    #[error("key retrieval failed")]
    KeyRetrieval(#[from] KeyRetrievalFailed),

    /// No signing key with a certificate matches the token's key identifier
    #[error("no matching signing key")]
    NoMatchingKey,

    /// The token could not be decoded
    #[error("invalid token format")]
    MalformedToken(#[source] JwtVerifyError),

    /// The token's algorithm is not approved, its signature is invalid, or
    /// the signing certificate is unusable
    #[error("signature/claim invalid")]
    InvalidSignature(#[source] JwtVerifyError),

    /// The token's claims were rejected (expired, not yet valid, wrong
    /// issuer or audience, no subject)
    #[error("signature/claim invalid")]
    ClaimsRejected(#[source] ClaimsRejected),
}

impl AuthorizeError {
    /// A short human-readable reason, suitable for logs
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedCredential => "missing or malformed authorization header",
            Self::KeyRetrieval(_) => "key retrieval failed",
            Self::NoMatchingKey => "no matching signing key",
            Self::MalformedToken(_) => "invalid token format",
            Self::InvalidSignature(_) | Self::ClaimsRejected(_) => "signature/claim invalid",
        }
    }
}

impl From<JwtVerifyError> for AuthorizeError {
    fn from(err: JwtVerifyError) -> Self {
        match err {
            err if err.is_malformed() => Self::MalformedToken(err),
            JwtVerifyError::ClaimsRejected(ClaimsRejected::InvalidAlgorithm) => {
                Self::InvalidSignature(ClaimsRejected::InvalidAlgorithm.into())
            }
            JwtVerifyError::ClaimsRejected(rejected) => Self::ClaimsRejected(rejected),
            err => Self::InvalidSignature(err),
        }
    }
}

impl From<ClaimsRejected> for AuthorizeError {
    fn from(rejected: ClaimsRejected) -> Self {
        JwtVerifyError::from(rejected).into()
    }
}
