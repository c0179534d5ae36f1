//! Signing key sets published by the identity provider
//!
//! Only the members this crate needs are read from each key: the key
//! identifier (`kid`) and the certificate chain (`x5c`). Everything else in
//! a published JWK is ignored.

use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::certificate::CertificatePem;

/// An identifier for a signing key
#[braid(serde, ref_doc = "A borrowed reference to a signing key identifier ([`KeyId`])")]
pub struct KeyId;

/// A base64 (standard alphabet, padded) DER-encoded X.509 certificate, as
/// found in a key's `x5c` chain
#[braid(
    serde,
    ref_doc = "A borrowed reference to a base64 DER certificate ([`CertificateBlob`])"
)]
pub struct CertificateBlob;

/// One published signing key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct SigningKey {
    kid: KeyId,
    #[serde(default)]
    x5c: Vec<CertificateBlob>,
}

impl SigningKey {
    /// Constructs a signing key record from its identifier and certificate chain
    pub fn new(kid: impl Into<KeyId>, x5c: Vec<CertificateBlob>) -> Self {
        Self {
            kid: kid.into(),
            x5c,
        }
    }

    /// The key identifier
    #[must_use]
    pub fn key_id(&self) -> &KeyIdRef {
        &self.kid
    }

    /// The certificate chain, leaf first
    #[must_use]
    pub fn certificate_chain(&self) -> &[CertificateBlob] {
        &self.x5c
    }

    /// The leaf certificate of the chain in PEM form
    ///
    /// Returns `None` when the key publishes no certificate.
    #[must_use]
    pub fn certificate(&self) -> Option<CertificatePem> {
        self.x5c
            .first()
            .map(|blob| CertificatePem::from_blob(blob))
    }
}

/// A signing key set, in the order published
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeySet {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<SigningKey>,
}

impl SigningKeySet {
    /// A view of the keys in this set
    #[must_use]
    pub fn keys(&self) -> &[SigningKey] {
        &self.keys
    }

    /// The number of keys in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Selects the key whose identifier equals `kid` exactly
    ///
    /// If the set holds duplicate identifiers, the first one in set order
    /// wins.
    #[must_use]
    pub fn select(&self, kid: &KeyIdRef) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.key_id() == kid)
    }
}

impl FromIterator<SigningKey> for SigningKeySet {
    fn from_iter<I: IntoIterator<Item = SigningKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<SigningKey>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MaybeKeysVisitor;

    impl<'de> serde::de::Visitor<'de> for MaybeKeysVisitor {
        type Value = Vec<SigningKey>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of signing key objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeKey::Key(key) => values.push(key),
                    MaybeKey::Unusable(key) => {
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kid = ?key.kid,
                            jwk.kty = ?key.kty,
                            "ignoring signing key without a usable kid or x5c"
                        );
                    }
                    MaybeKey::NotAnObject(_) => {
                        tracing::warn!(jwks.idx = index, "ignoring non-object key entry");
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeKey {
        Key(SigningKey),
        Unusable(KeyLike),
        NotAnObject(serde::de::IgnoredAny),
    }

    #[derive(Deserialize)]
    struct KeyLike {
        #[serde(default)]
        kid: Option<serde_json::Value>,
        #[serde(default)]
        kty: Option<String>,
    }

    deserializer.deserialize_seq(MaybeKeysVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;

    const JWKS: &str = r#"
        {
            "keys": [
                {
                    "alg": "RS256",
                    "kty": "RSA",
                    "use": "sig",
                    "n": "yzAaJ3Pmt6y",
                    "e": "AQAB",
                    "kid": "K1",
                    "x5t": "abc",
                    "x5c": ["CERTDATA", "INTERMEDIATE"]
                },
                {
                    "kty": "RSA",
                    "kid": "K2",
                    "x5c": ["OTHERCERT"]
                }
            ]
        }
    "#;

    const JWKS_WITH_UNUSABLE_ENTRIES: &str = r#"
        {
            "keys": [
                { "kty": "RSA", "n": "abc", "e": "AQAB" },
                { "kid": 17, "x5c": ["CERTDATA"] },
                { "kid": "K3", "x5c": "not-a-list" },
                42,
                { "kid": "K1", "x5c": ["CERTDATA"] }
            ]
        }
    "#;

    #[test]
    #[traced_test]
    fn decodes_published_keys() -> Result<()> {
        let jwks: SigningKeySet = serde_json::from_str(JWKS)?;

        assert_eq!(jwks.len(), 2);
        assert_eq!(jwks.keys()[0].key_id(), KeyIdRef::from_str("K1"));
        assert_eq!(
            jwks.keys()[0].certificate_chain(),
            [
                CertificateBlob::from_static("CERTDATA"),
                CertificateBlob::from_static("INTERMEDIATE")
            ]
        );
        Ok(())
    }

    #[test]
    #[traced_test]
    fn skips_unusable_entries() -> Result<()> {
        let jwks: SigningKeySet = serde_json::from_str(JWKS_WITH_UNUSABLE_ENTRIES)?;

        assert_eq!(jwks.len(), 1);
        assert_eq!(jwks.keys()[0].key_id(), KeyIdRef::from_str("K1"));
        assert!(logs_contain("ignoring signing key without a usable kid or x5c"));
        assert!(logs_contain("ignoring non-object key entry"));
        Ok(())
    }

    #[test]
    fn missing_keys_member_is_an_error() {
        assert!(serde_json::from_str::<SigningKeySet>(r#"{ "items": [] }"#).is_err());
        assert!(serde_json::from_str::<SigningKeySet>(r#"{ "keys": {} }"#).is_err());
    }

    #[test]
    fn selects_by_exact_key_id() -> Result<()> {
        let jwks: SigningKeySet = serde_json::from_str(JWKS)?;

        let key = jwks.select(KeyIdRef::from_str("K2"));
        assert_eq!(
            key.map(SigningKey::key_id),
            Some(KeyIdRef::from_str("K2"))
        );

        assert!(jwks.select(KeyIdRef::from_str("k2")).is_none());
        assert!(jwks.select(KeyIdRef::from_str("K")).is_none());
        assert!(jwks.select(KeyIdRef::from_str("")).is_none());
        Ok(())
    }

    #[test]
    fn first_duplicate_wins() {
        let jwks: SigningKeySet = [
            SigningKey::new("K1", vec![CertificateBlob::from_static("FIRST")]),
            SigningKey::new("K1", vec![CertificateBlob::from_static("SECOND")]),
        ]
        .into_iter()
        .collect();

        let key = jwks.select(KeyIdRef::from_str("K1"));
        assert_eq!(
            key.map(SigningKey::certificate_chain),
            Some(&[CertificateBlob::from_static("FIRST")][..])
        );
    }

    #[test]
    fn unknown_key_id_selects_nothing() {
        let jwks: SigningKeySet = [SigningKey::new(
            "K1",
            vec![CertificateBlob::from_static("CERTDATA")],
        )]
        .into_iter()
        .collect();

        assert!(jwks.select(KeyIdRef::from_str("K2")).is_none());
    }

    #[test]
    fn leaf_certificate_is_wrapped_as_pem() {
        let key = SigningKey::new(
            "K1",
            vec![
                CertificateBlob::from_static("CERTDATA"),
                CertificateBlob::from_static("INTERMEDIATE"),
            ],
        );

        let pem = key.certificate();
        assert_eq!(
            pem.as_deref().map(|p| p.as_str()),
            Some("-----BEGIN CERTIFICATE-----\nCERTDATA\n-----END CERTIFICATE-----")
        );
    }

    #[test]
    fn key_without_certificate_has_no_pem() -> Result<()> {
        let key: SigningKey = serde_json::from_str(r#"{ "kid": "K1" }"#)?;
        assert!(key.certificate().is_none());
        Ok(())
    }
}
