//! Sensitive field encryption under the platform certificate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::platform::PlatformCertificateCache;
use crate::Result;

/// A field encrypted with RSA-OAEP, plus the serial of the certificate used.
///
/// Requests carrying encrypted fields must send that serial in the
/// `Wechatpay-Serial` header so the platform picks the matching private key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    /// Base64 ciphertext.
    pub ciphertext: String,
    /// Serial of the platform certificate the field was encrypted under.
    pub serial_no: String,
}

/// Encrypts PII fields under the platform's current certificate.
#[derive(Clone, Debug)]
pub struct Encryptor {
    cache: Arc<PlatformCertificateCache>,
}

impl Encryptor {
    /// Create an encryptor backed by a certificate cache.
    pub fn new(cache: Arc<PlatformCertificateCache>) -> Self {
        Self { cache }
    }

    /// Encrypt one field, refreshing the cache first if needed.
    ///
    /// OAEP is randomized; the same plaintext never yields the same
    /// ciphertext twice. Empty strings are allowed.
    pub async fn encrypt(&self, plaintext: &str) -> Result<EncryptedField> {
        let cert = self.cache.current_certificate().await?;
        Ok(EncryptedField {
            ciphertext: cert.encrypt(plaintext)?,
            serial_no: cert.serial_number().to_string(),
        })
    }

    /// Encrypt several fields under one certificate.
    ///
    /// Returns the ciphertexts in input order and the certificate serial.
    pub async fn encrypt_all(&self, plaintexts: &[&str]) -> Result<(Vec<String>, String)> {
        let cert = self.cache.current_certificate().await?;
        let ciphertexts = plaintexts
            .iter()
            .map(|p| cert.encrypt(p))
            .collect::<Result<Vec<_>>>()?;
        Ok((ciphertexts, cert.serial_number().to_string()))
    }
}
