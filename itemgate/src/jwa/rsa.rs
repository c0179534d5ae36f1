//! RSA public keys recovered from X.509 certificates

use openssl::x509::X509;

use crate::{certificate::CertificatePemRef, error, jwa::Algorithm, jws};

const MIN_MODULUS_BYTES: usize = 2048 / 8;
const MAX_MODULUS_BYTES: usize = 8192 / 8;

/// RSA public key components
#[derive(Clone, Eq, PartialEq)]
pub struct PublicKey {
    /// The public modulus, big-endian without leading zeros
    modulus: Vec<u8>,

    /// The public exponent, big-endian without leading zeros
    exponent: Vec<u8>,
}

impl PublicKey {
    /// Extracts the RSA public key from a PEM-encoded X.509 certificate
    ///
    /// Only the certificate's subject public key is used. Validity dates and
    /// the issuing chain of the certificate are not evaluated; the identity
    /// provider's key directory is the trust anchor.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM body is not a DER certificate, or if the
    /// certificate does not carry an RSA key of an acceptable size.
    pub fn from_certificate_pem(pem: &CertificatePemRef) -> Result<Self, error::KeyRejected> {
        let der = pem.to_der()?;
        let certificate = X509::from_der(&der).map_err(error::key_rejected)?;
        let key = certificate.public_key().map_err(error::key_rejected)?;
        let rsa = key.rsa().map_err(error::key_rejected)?;

        Self::from_components(rsa.n().to_vec(), rsa.e().to_vec())
    }

    /// Constructs a public key from the modulus and exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the modulus is not between 2048 and 8192 bits.
    pub fn from_components(modulus: Vec<u8>, exponent: Vec<u8>) -> Result<Self, error::KeyRejected> {
        if !(MIN_MODULUS_BYTES..=MAX_MODULUS_BYTES).contains(&modulus.len()) {
            return Err(error::key_rejected(
                "key modulus must be between 2048 and 8192 bits",
            ));
        }

        if exponent.is_empty() {
            return Err(error::key_rejected("key exponent is empty"));
        }

        Ok(Self { modulus, exponent })
    }

    /// The size of the modulus in bits
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.modulus.len() * 8
    }
}

impl jws::Verifier for PublicKey {
    type Error = error::KeyVerifyError;

    fn can_verify(&self, alg: Algorithm) -> bool {
        alg == Algorithm::RS256
    }

    fn verify(&self, alg: Algorithm, data: &[u8], signature: &[u8]) -> Result<(), Self::Error> {
        if !self.can_verify(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(&ring::signature::RSA_PKCS1_2048_8192_SHA256, data, signature)
            .map_err(|_| error::signature_mismatch().into())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("modulus_bits", &self.modulus_bits())
            .finish_non_exhaustive()
    }
}
