#![allow(dead_code)]

use std::time::Duration;

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use color_eyre::Result;
use itemgate::{
    clock::{TestClock, UnixTime},
    jwks::{CertificateBlob, SigningKey, SigningKeySet},
    Authorizer, StaticKeyDirectory,
};
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    pkey::{PKey, Private},
    rsa::{Padding, Rsa},
    sign::{RsaPssSaltlen, Signer},
    x509::{X509NameBuilder, X509},
};
use serde_json::{json, Value};

pub const NOW: UnixTime = UnixTime(1_700_000_000);

/// An identity provider with one RSA signing key and a self-signed
/// certificate for it
pub struct TestIssuer {
    kid: String,
    key: PKey<Private>,
    certificate: X509,
}

impl TestIssuer {
    pub fn new(kid: &str) -> Result<Self> {
        let key = PKey::from_rsa(Rsa::generate(2048)?)?;

        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_text("CN", "itemgate test issuer")?;
        let name = name.build();

        let serial = {
            let mut bn = BigNum::new()?;
            bn.rand(64, MsbOption::MAYBE_ZERO, false)?;
            bn.to_asn1_integer()?
        };

        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(365)?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.sign(&key, MessageDigest::sha256())?;

        Ok(Self {
            kid: kid.to_owned(),
            key,
            certificate: builder.build(),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The certificate as published in `x5c`: standard base64 DER on one line
    pub fn x5c(&self) -> Result<CertificateBlob> {
        Ok(CertificateBlob::new(STANDARD.encode(self.certificate.to_der()?)))
    }

    /// The certificate in PEM form
    pub fn certificate_pem(&self) -> Result<Vec<u8>> {
        Ok(self.certificate.to_pem()?)
    }

    pub fn signing_key(&self) -> Result<SigningKey> {
        Ok(SigningKey::new(self.kid.as_str(), vec![self.x5c()?]))
    }

    pub fn key_set(&self) -> Result<SigningKeySet> {
        Ok([self.signing_key()?].into_iter().collect())
    }

    /// The key set as the identity provider would publish it
    pub fn jwks_json(&self) -> Result<Value> {
        Ok(json!({
            "keys": [{
                "alg": "RS256",
                "kty": "RSA",
                "use": "sig",
                "kid": self.kid,
                "x5c": [self.x5c()?.as_str()],
            }]
        }))
    }

    /// A well-formed RS256 token for `sub`, valid for ten minutes after `now`
    pub fn token_for(&self, sub: &str, now: UnixTime) -> Result<String> {
        self.sign_rs256(
            &json!({ "alg": "RS256", "typ": "JWT", "kid": self.kid }),
            &json!({
                "sub": sub,
                "iat": now.0,
                "exp": now.saturating_add(Duration::from_secs(600)).0,
            }),
        )
    }

    pub fn sign_rs256(&self, header: &Value, claims: &Value) -> Result<String> {
        let message = message(header, claims)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(message.as_bytes())?;
        Ok(join(&message, &signer.sign_to_vec()?))
    }

    pub fn sign_ps256(&self, header: &Value, claims: &Value) -> Result<String> {
        let message = message(header, claims)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        signer.update(message.as_bytes())?;
        Ok(join(&message, &signer.sign_to_vec()?))
    }
}

/// Signs with HMAC-SHA256, as an attacker holding only public material would
pub fn sign_hs256(secret: &[u8], header: &Value, claims: &Value) -> Result<String> {
    let message = message(header, claims)?;
    let key = PKey::hmac(secret)?;
    let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
    signer.update(message.as_bytes())?;
    Ok(join(&message, &signer.sign_to_vec()?))
}

/// An unsecured token with an empty signature
pub fn unsigned(header: &Value, claims: &Value) -> Result<String> {
    Ok(format!("{}.", message(header, claims)?))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn authorizer_for(keys: SigningKeySet) -> Authorizer<StaticKeyDirectory, TestClock> {
    Authorizer::new(StaticKeyDirectory::new(keys)).with_clock(TestClock::new(NOW))
}

fn message(header: &Value, claims: &Value) -> Result<String> {
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    ))
}

fn join(message: &str, signature: &[u8]) -> String {
    format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature))
}
