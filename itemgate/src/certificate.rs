//! PEM wrapping of certificates published in a key set's `x5c` chains

use aliri_braid::braid;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{error, jwks::CertificateBlobRef};

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";

/// A PEM-encoded X.509 certificate
#[braid(ref_doc = "A borrowed reference to a PEM-encoded certificate ([`CertificatePem`])")]
pub struct CertificatePem;

impl CertificatePem {
    /// Wraps a base64 DER certificate blob with PEM delimiters
    ///
    /// The blob is placed between the delimiters exactly as published, on a
    /// single line. It is neither re-encoded nor re-wrapped.
    ///
    /// ```
    /// use itemgate::{certificate::CertificatePem, jwks::CertificateBlobRef};
    ///
    /// let pem = CertificatePem::from_blob(CertificateBlobRef::from_str("CERTDATA"));
    /// assert_eq!(
    ///     pem.as_str(),
    ///     "-----BEGIN CERTIFICATE-----\nCERTDATA\n-----END CERTIFICATE-----",
    /// );
    /// ```
    pub fn from_blob(blob: &CertificateBlobRef) -> Self {
        Self::from(format!("{PEM_HEADER}\n{blob}\n{PEM_FOOTER}"))
    }
}

impl CertificatePemRef {
    /// Decodes the DER bytes between the PEM delimiters
    ///
    /// Line breaks and other whitespace inside the body are ignored, so both
    /// single-line and 64-column bodies are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delimiters are missing or the body is not
    /// valid base64.
    pub fn to_der(&self) -> Result<Vec<u8>, error::KeyRejected> {
        let body = self
            .as_str()
            .trim()
            .strip_prefix(PEM_HEADER)
            .and_then(|rest| rest.strip_suffix(PEM_FOOTER))
            .ok_or_else(|| error::key_rejected("missing PEM certificate delimiters"))?;

        let compact: String = body.split_whitespace().collect();
        STANDARD.decode(compact).map_err(error::key_rejected)
    }
}
