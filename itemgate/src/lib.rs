//! A stateless authorization gate for bearer tokens issued by an external
//! identity provider.
//!
//! Each call to [`Authorizer::authorize()`] takes the raw `Authorization`
//! header of an inbound request and produces exactly one
//! [`AuthorizationDecision`]:
//!
//! * **Allow**, with the token's `sub` claim as the principal, when the token
//!   is an RS256-signed JWT whose `kid` names a certificate published by the
//!   identity provider's key directory and whose validity window covers the
//!   current time.
//! * **Deny**, with a fixed placeholder principal, in every other case.
//!
//! The pipeline runs in this order:
//!
//! 1. the bearer credential is extracted from the header ([`credential`]);
//! 2. the token is split and its header and payload decoded ([`jwt`]);
//! 3. the signing keys are fetched from the key directory ([`directory`]);
//! 4. the key named by the token's `kid` is selected ([`jwks`]);
//! 5. its leaf certificate is wrapped as PEM ([`certificate`]) and the RSA
//!    public key extracted from it ([`jwa::rsa`]);
//! 6. the algorithm, signature and temporal claims are checked ([`jwt`]);
//! 7. the outcome is turned into a decision ([`decision`]).
//!
//! Failures at any step are typed ([`error::AuthorizeError`]) and are only
//! converted into a Deny decision at the very edge, so the reason is available
//! for logging but never leaks into the decision itself.
//!
//! # Example
//!
//! ```no_run
//! use itemgate::{AuthorizerConfig, Authorizer, AuthorizerEvent};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthorizerConfig::new("https://example.auth0.com/.well-known/jwks.json");
//! let authorizer = Authorizer::from_config(&config)?;
//!
//! let event = AuthorizerEvent::new("Bearer eyJhbGciOiJSUzI1NiIsImtpZCI6IksxIn0.e30.c2ln");
//! let decision = authorizer.authorize(&event).await;
//!
//! println!("{}", serde_json::to_string_pretty(&decision)?);
//! # Ok(()) }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authorizer;
pub mod certificate;
pub mod clock;
mod config;
pub mod credential;
pub mod decision;
pub mod directory;
pub mod error;
pub mod jwa;
pub mod jwks;
pub mod jws;
pub mod jwt;

pub use authorizer::{Authorizer, AuthorizerEvent};
pub use config::{AuthorizerConfig, ConfigError};
#[doc(inline)]
pub use decision::{AuthorizationDecision, Effect, PrincipalId};
#[doc(inline)]
pub use directory::{CachedKeyDirectory, KeyDirectory, RemoteKeyDirectory, StaticKeyDirectory};
#[doc(inline)]
pub use jwks::{SigningKey, SigningKeySet};
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
