//! JSON Web Token decoding and validation
//!
//! A token is processed in two checkpoints. [`JwtRef::decompose()`] splits it
//! into its three sections and decodes the header and payload. Any failure
//! there means the token is not structurally a JWT. [`Decomposed::verify_with_clock()`]
//! then checks the algorithm against the approved list, verifies the
//! signature, and validates the temporal and identity claims.
//!
//! The claims returned by [`Decomposed::untrusted_claims()`] come from the
//! token itself and must not be relied upon until the token has been
//! verified.

use std::{fmt, time::Duration};

use aliri_braid::braid;
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, UnixTime},
    error, jwa,
    jwks::{KeyId, KeyIdRef},
    jws,
};

/// Base64url without padding, as used by JWS compact serialization.
/// Padded sections are tolerated on decode.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const REDACTED: &str = "***JWT***";

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token in compact serialization
///
/// Tokens are bearer credentials. The [`Debug`][JwtRef#impl-Debug] and
/// [`Display`][JwtRef#impl-Display] implementations never print the payload
/// or the signature.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a JSON Web Token ([`Jwt`])\n\
    \n\
    The [`Debug`][Self#impl-Debug] and [`Display`][Self#impl-Display] \
    implementations never print the payload or the signature."
)]
#[must_use]
pub struct Jwt;

impl JwtRef {
    /// The encoded header section, or the whole token if it has no `.`
    fn header_section(&self) -> &str {
        self.as_str()
            .split_once('.')
            .map_or(self.as_str(), |(header, _)| header)
    }
}

/// Prints a placeholder. The alternate form (`{:#?}`) reveals the encoded
/// header section only.
///
/// ```
/// # use itemgate::jwt::JwtRef;
/// let token = JwtRef::from_str("eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ1c2VyMSJ9.c2ln");
///
/// assert_eq!(format!("{:?}", token), "***JWT***");
/// assert_eq!(format!("{:#?}", token), "\"eyJhbGciOiJSUzI1NiJ9.…\"");
/// ```
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "\"{}.…\"", self.header_section())
        } else {
            f.write_str(REDACTED)
        }
    }
}

/// Prints a placeholder. The alternate form (`{:#}`) reveals the encoded
/// header section only.
///
/// ```
/// # use itemgate::jwt::JwtRef;
/// let token = JwtRef::from_str("eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ1c2VyMSJ9.c2ln");
///
/// assert_eq!(token.to_string(), "***JWT***");
/// assert_eq!(format!("{:#}", token), "eyJhbGciOiJSUzI1NiJ9.…");
/// ```
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}.…", self.header_section())
        } else {
            f.write_str(REDACTED)
        }
    }
}

macro_rules! expect_three {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next(), i.next()) {
            (Some(first), Some(second), Some(third), None) => Some((first, second, third)),
            _ => None,
        }
    }};
}

impl JwtRef {
    /// Splits the token into its sections and decodes the header and payload
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have exactly three sections, or
    /// if any section fails base64url decoding, or if the header or payload
    /// is not the expected JSON.
    pub fn decompose<C>(&self) -> Result<Decomposed<'_, C>, error::JwtVerifyError>
    where
        C: for<'de> Deserialize<'de>,
    {
        let (h_str, p_str, s_str) =
            expect_three!(self.as_str().split('.')).ok_or_else(error::malformed_jwt)?;

        let h_raw = BASE64_URL
            .decode(h_str)
            .map_err(error::malformed_jwt_header)?;
        let header: BasicHeaders =
            serde_json::from_slice(&h_raw).map_err(error::malformed_jwt_header)?;

        let p_raw = BASE64_URL
            .decode(p_str)
            .map_err(error::malformed_jwt_payload)?;
        let claims: C = serde_json::from_slice(&p_raw).map_err(error::malformed_jwt_payload)?;

        let signature = BASE64_URL
            .decode(s_str)
            .map_err(error::malformed_jwt_signature)?;

        Ok(Decomposed {
            header,
            message: &self.as_str()[..h_str.len() + 1 + p_str.len()],
            claims,
            signature,
        })
    }
}

/// A structurally valid JWT whose signature and claims have not yet been
/// checked
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a, C = BasicClaims> {
    header: BasicHeaders,
    message: &'a str,
    claims: C,
    signature: Vec<u8>,
}

impl<'a, C> Decomposed<'a, C>
where
    C: CoreClaims,
{
    /// The untrusted header of the JWT
    ///
    /// **WARNING:** *An adversary can place arbitrary data into the header.*
    /// Only use it to decide which key to verify the token with.
    pub fn untrusted_header(&self) -> &BasicHeaders {
        &self.header
    }

    /// The untrusted claims of the JWT
    ///
    /// **WARNING:** *These claims have not been validated and should not be
    /// trusted.* Use [`verify_with_clock()`][Self::verify_with_clock] to validate them.
    pub fn untrusted_claims(&self) -> &C {
        &self.claims
    }

    /// The signed message: the encoded header and payload separated by a `.`
    #[must_use]
    pub fn untrusted_message(&self) -> &'a str {
        self.message
    }

    /// Verifies the token against the given key and validator
    ///
    /// The algorithm is checked against the validator's approved list before
    /// the key is used, so a token naming an unapproved algorithm never
    /// reaches signature verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not approved, the signature does
    /// not match, or the claims are rejected.
    pub fn verify_with_clock<V, K>(
        self,
        key: &V,
        validator: &CoreValidator,
        clock: &K,
    ) -> Result<Validated<C>, error::JwtVerifyError>
    where
        V: jws::Verifier,
        error::JwtVerifyError: From<V::Error>,
        K: Clock,
    {
        let alg = self.header.alg();
        if !validator.approves(alg) {
            return Err(error::ClaimsRejected::InvalidAlgorithm.into());
        }

        key.verify(alg, self.message.as_bytes(), &self.signature)?;

        validator.validate_with_clock(&self.claims, clock)?;

        Ok(Validated {
            headers: self.header,
            claims: self.claims,
        })
    }
}

/// A JWT whose signature and claims have been verified
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Validated<C = BasicClaims> {
    headers: BasicHeaders,
    claims: C,
}

impl<C> Validated<C> {
    /// The validated header
    pub fn headers(&self) -> &BasicHeaders {
        &self.headers
    }

    /// The validated claims
    pub fn claims(&self) -> &C {
        &self.claims
    }
}

/// Access to the registered claims used by [`CoreValidator`]
pub trait CoreClaims {
    /// Not before (`nbf`)
    fn nbf(&self) -> Option<UnixTime>;

    /// Expires (`exp`)
    fn exp(&self) -> Option<UnixTime>;

    /// Audiences (`aud`)
    fn aud(&self) -> &Audiences;

    /// Issuer (`iss`)
    fn iss(&self) -> Option<&IssuerRef>;

    /// Subject (`sub`)
    fn sub(&self) -> Option<&SubjectRef>;
}

/// The JWT header members needed to select a key and an algorithm
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[must_use]
pub struct BasicHeaders {
    alg: jwa::Algorithm,
    #[serde(default)]
    kid: Option<KeyId>,
}

impl BasicHeaders {
    /// The signing algorithm named by the token
    #[must_use]
    pub fn alg(&self) -> jwa::Algorithm {
        self.alg
    }

    /// The identifier of the key the token claims to be signed with
    #[must_use]
    pub fn kid(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }
}

/// The registered claims of a JWT
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct BasicClaims {
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
}

impl BasicClaims {
    /// An empty claim set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `aud` claim to a single audience
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences::single(aud);
        self
    }

    /// Sets the `iss` claim
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `sub` claim
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the `exp` claim
    pub fn with_expiration(mut self, time: UnixTime) -> Self {
        self.exp = Some(time);
        self
    }

    /// Sets the `nbf` claim
    pub fn with_not_before(mut self, time: UnixTime) -> Self {
        self.nbf = Some(time);
        self
    }
}

impl CoreClaims for BasicClaims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        self.exp
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }
}

/// The `aud` claim, which may be a single string or an array of strings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
#[must_use]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// An audience set with a single audience
    pub fn single(aud: impl Into<Audience>) -> Self {
        Self(vec![aud.into()])
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates through the audiences in the set
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(AsRef::as_ref)
    }
}

impl From<Vec<Audience>> for Audiences {
    fn from(vals: Vec<Audience>) -> Self {
        Self(vals)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    fn from(mut auds: Audiences) -> Self {
        match auds.0.pop() {
            Some(only) if auds.0.is_empty() => Self::One(only),
            Some(last) => {
                auds.0.push(last);
                Self::Many(auds.0)
            }
            None => Self::Many(Vec::new()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Validates the algorithm and the registered claims of a token
///
/// The default validator approves no algorithm at all and allows no clock
/// leeway. `exp` and `nbf` are checked whenever the token carries them; use
/// [`require_expiration()`][Self::require_expiration] to reject tokens
/// without `exp`.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct CoreValidator {
    approved_algorithms: Vec<jwa::Algorithm>,
    leeway: Duration,
    require_expiration: bool,
    allowed_audiences: Vec<Audience>,
    issuer: Option<Issuer>,
    valid_subjects: Option<Regex>,
}

impl CoreValidator {
    /// Allows a grace period on either side of the `nbf` and `exp` claims
    pub fn with_leeway(self, leeway: Duration) -> Self {
        Self { leeway, ..self }
    }

    /// Allows a grace period, in seconds, on either side of the `nbf` and
    /// `exp` claims
    pub fn with_leeway_secs(self, leeway: u64) -> Self {
        self.with_leeway(Duration::from_secs(leeway))
    }

    /// Rejects tokens that carry no `exp` claim
    pub fn require_expiration(self) -> Self {
        Self {
            require_expiration: true,
            ..self
        }
    }

    /// Approves a single algorithm
    pub fn add_approved_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.approved_algorithms.push(alg);
        self
    }

    /// Adds a single audience to the set of allowed audiences
    pub fn add_allowed_audience(mut self, audience: Audience) -> Self {
        self.allowed_audiences.push(audience);
        self
    }

    /// Adds multiple audiences to the set of allowed audiences
    pub fn extend_allowed_audiences<I: IntoIterator<Item = Audience>>(mut self, auds: I) -> Self {
        self.allowed_audiences.extend(auds);
        self
    }

    /// Requires that tokens name a particular issuer
    pub fn require_issuer(self, issuer: Issuer) -> Self {
        Self {
            issuer: Some(issuer),
            ..self
        }
    }

    /// Requires that the `sub` claim exists and matches a regular expression
    pub fn check_subject(self, sub_regex: Regex) -> Self {
        Self {
            valid_subjects: Some(sub_regex),
            ..self
        }
    }

    /// Whether the algorithm is in the approved list
    #[must_use]
    pub fn approves(&self, alg: jwa::Algorithm) -> bool {
        self.approved_algorithms.contains(&alg)
    }

    /// Validates the registered claims at the clock's current time
    ///
    /// # Errors
    ///
    /// Returns an error naming the first claim that was rejected.
    pub fn validate_with_clock<T, K>(&self, claims: &T, clock: &K) -> Result<(), error::ClaimsRejected>
    where
        T: CoreClaims,
        K: Clock,
    {
        let now = clock.now();
        let leeway = self.leeway;

        match claims.exp() {
            Some(exp) if exp.saturating_add(leeway) <= now => {
                return Err(error::ClaimsRejected::TokenExpired);
            }
            None if self.require_expiration => {
                return Err(error::ClaimsRejected::MissingRequiredClaim("exp"));
            }
            _ => {}
        }

        if let Some(nbf) = claims.nbf() {
            if nbf > now.saturating_add(leeway) {
                return Err(error::ClaimsRejected::TokenNotYetValid);
            }
        }

        if !self.allowed_audiences.is_empty() {
            if claims.aud().is_empty() {
                return Err(error::ClaimsRejected::MissingRequiredClaim("aud"));
            }

            let found = claims
                .aud()
                .iter()
                .any(|a| self.allowed_audiences.iter().any(|e| a == e));
            if !found {
                return Err(error::ClaimsRejected::InvalidAudience);
            }
        }

        if let Some(allowed_iss) = &self.issuer {
            let iss = claims
                .iss()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("iss"))?;
            if iss != allowed_iss {
                return Err(error::ClaimsRejected::InvalidIssuer);
            }
        }

        if let Some(valid_subs) = &self.valid_subjects {
            let sub = claims
                .sub()
                .ok_or(error::ClaimsRejected::MissingRequiredClaim("sub"))?;
            if !valid_subs.is_match(sub.as_str()) {
                return Err(error::ClaimsRejected::InvalidSubject);
            }
        }

        Ok(())
    }
}
