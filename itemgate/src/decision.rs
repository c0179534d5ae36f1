//! Access-control decisions returned to the request router
//!
//! A decision always has one of two shapes: Allow with the verified subject
//! as the principal, or Deny with the [`UNAUTHENTICATED_PRINCIPAL`]
//! placeholder. Serialized, a decision looks like this:
//!
//! ```json
//! {
//!   "principalId": "auth0|1234",
//!   "policyDocument": {
//!     "Version": "2012-10-17",
//!     "Statement": [
//!       { "Action": "execute-api:Invoke", "Effect": "Allow", "Resource": "*" }
//!     ]
//!   }
//! }
//! ```

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::jwt::SubjectRef;

/// The policy language version understood by the router
pub const POLICY_VERSION: &str = "2012-10-17";

/// The action granted or refused by a decision
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

/// The resource a decision applies to
pub const ANY_RESOURCE: &str = "*";

/// The principal reported on every Deny decision
pub const UNAUTHENTICATED_PRINCIPAL: &str = "user";

/// The identity a decision is issued for
#[braid(serde, ref_doc = "A borrowed reference to a [`PrincipalId`]")]
pub struct PrincipalId;

impl From<&SubjectRef> for PrincipalId {
    fn from(sub: &SubjectRef) -> Self {
        Self::new(sub.as_str().to_owned())
    }
}

/// Whether the caller is admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// The call is admitted
    Allow,
    /// The call is rejected
    Deny,
}

/// A single policy statement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    action: String,
    effect: Effect,
    resource: String,
}

impl Statement {
    fn invoke(effect: Effect) -> Self {
        Self {
            action: INVOKE_ACTION.to_owned(),
            effect,
            resource: ANY_RESOURCE.to_owned(),
        }
    }

    /// The statement's effect
    #[must_use]
    pub fn effect(&self) -> Effect {
        self.effect
    }
}

/// A policy document holding exactly one statement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    version: String,
    statement: Vec<Statement>,
}

/// The outcome of one authorization
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[must_use]
pub struct AuthorizationDecision {
    principal_id: PrincipalId,
    policy_document: PolicyDocument,
}

impl AuthorizationDecision {
    fn new(principal_id: PrincipalId, effect: Effect) -> Self {
        Self {
            principal_id,
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_owned(),
                statement: vec![Statement::invoke(effect)],
            },
        }
    }

    /// Admits the call on behalf of `principal`
    pub fn allow(principal: impl Into<PrincipalId>) -> Self {
        Self::new(principal.into(), Effect::Allow)
    }

    /// Rejects the call
    pub fn deny() -> Self {
        Self::new(
            PrincipalId::from_static(UNAUTHENTICATED_PRINCIPAL),
            Effect::Deny,
        )
    }

    /// Maps a verification outcome into a decision
    ///
    /// The error itself is discarded; a Deny decision never reveals why the
    /// call was rejected.
    pub fn from_outcome<P, E>(outcome: Result<P, E>) -> Self
    where
        P: Into<PrincipalId>,
    {
        match outcome {
            Ok(principal) => Self::allow(principal),
            Err(_) => Self::deny(),
        }
    }

    /// The principal the decision was issued for
    #[must_use]
    pub fn principal_id(&self) -> &PrincipalIdRef {
        &self.principal_id
    }

    /// The decision's effect
    #[must_use]
    pub fn effect(&self) -> Effect {
        self.policy_document
            .statement
            .first()
            .map_or(Effect::Deny, Statement::effect)
    }

    /// Whether the call is admitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.effect() == Effect::Allow
    }
}
