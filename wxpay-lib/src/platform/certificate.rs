//! Platform certificates and X.509 helpers.

use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

use crate::crypto::{encrypt_oaep, verify_signature};
use crate::{Result, WxPayError};

/// Fields extracted from a PEM X.509 certificate.
#[derive(Clone, Debug)]
pub struct ParsedCertificate {
    /// Serial as upper-case hex without leading zeros.
    pub serial_number: String,
    /// RSA subject public key.
    pub public_key: RsaPublicKey,
    /// X.509 `notBefore`.
    pub not_before: DateTime<Utc>,
    /// X.509 `notAfter`.
    pub not_after: DateTime<Utc>,
}

/// Parse a PEM X.509 certificate carrying an RSA key.
pub fn parse_certificate_pem(pem: &str) -> Result<ParsedCertificate> {
    let cert = Certificate::from_pem(pem.trim().as_bytes())
        .map_err(|e| WxPayError::invalid_data("certificate", e.to_string()))?;
    let tbs = &cert.tbs_certificate;

    let spki = tbs
        .subject_public_key_info
        .to_der()
        .map_err(|e| WxPayError::invalid_data("certificate", e.to_string()))?;
    let public_key = RsaPublicKey::from_public_key_der(&spki).map_err(|e| {
        WxPayError::invalid_data("certificate", format!("not an RSA public key: {}", e))
    })?;

    Ok(ParsedCertificate {
        serial_number: serial_hex(tbs.serial_number.as_bytes()),
        public_key,
        not_before: unix_time(tbs.validity.not_before.to_unix_duration())?,
        not_after: unix_time(tbs.validity.not_after.to_unix_duration())?,
    })
}

/// Format a big-endian serial as upper-case hex without leading zeros.
pub fn serial_hex(bytes: &[u8]) -> String {
    let hex = hex::encode_upper(bytes);
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn unix_time(since_epoch: std::time::Duration) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(since_epoch.as_secs() as i64, 0)
        .ok_or_else(|| WxPayError::invalid_data("certificate", "validity out of range"))
}

/// A platform signing certificate.
///
/// Immutable once built. `not_before`/`not_after` are the platform-declared
/// effective and expiry times from the download record, which drive cache
/// expiry and rotation.
#[derive(Clone)]
pub struct PlatformCertificate {
    serial_number: String,
    public_key: RsaPublicKey,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl PlatformCertificate {
    /// Create a certificate from its parts.
    pub fn new(
        serial_number: impl Into<String>,
        public_key: RsaPublicKey,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            public_key,
            not_before,
            not_after,
        }
    }

    /// Parse a PEM certificate and attach the platform-declared validity.
    ///
    /// When `expected_serial` is given it must match the certificate's own
    /// serial number.
    pub fn from_pem(
        pem: &str,
        expected_serial: Option<&str>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<Self> {
        let parsed = parse_certificate_pem(pem)?;
        if let Some(expected) = expected_serial {
            if !expected.eq_ignore_ascii_case(&parsed.serial_number) {
                return Err(WxPayError::invalid_data(
                    "certificate",
                    format!(
                        "serial mismatch: record says {}, certificate says {}",
                        expected, parsed.serial_number
                    ),
                ));
            }
        }

        Ok(Self::new(
            parsed.serial_number,
            parsed.public_key,
            not_before,
            not_after,
        ))
    }

    /// Serial number (upper-case hex).
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// RSA public key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Effective time.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Expiry time.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// True while `now` is before the expiry time.
    pub fn is_unexpired_at(&self, now: DateTime<Utc>) -> bool {
        now < self.not_after
    }

    /// True while `now` is inside `[not_before, not_after)`.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }

    /// Verify a base64 signature over `message`.
    pub fn verify(&self, message: &[u8], signature_b64: &str) -> Result<bool> {
        verify_signature(&self.public_key, message, signature_b64)
    }

    /// RSA-OAEP encrypt `plaintext` under this certificate.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        encrypt_oaep(&self.public_key, plaintext)
    }
}

impl std::fmt::Debug for PlatformCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCertificate")
            .field("serial_number", &self.serial_number)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}
