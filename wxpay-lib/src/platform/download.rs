//! Wire types for the `/v3/certificates` download.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::ApiV3Key;
use crate::platform::PlatformCertificate;
use crate::{Result, WxPayError};

/// Path of the certificate download endpoint.
pub const CERTIFICATES_PATH: &str = "/v3/certificates";

/// Algorithm tag carried by sealed resources.
pub const AEAD_ALGORITHM: &str = "AEAD_AES_256_GCM";

/// An AEAD-sealed payload as delivered by the platform.
///
/// Shared by certificate records (`encrypt_certificate`) and notification
/// bodies (`resource`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResource {
    /// Always `AEAD_AES_256_GCM` today.
    #[serde(default)]
    pub algorithm: String,
    /// Base64 of `ciphertext || tag`.
    pub ciphertext: String,
    /// Associated data, used as raw UTF-8 bytes.
    #[serde(default)]
    pub associated_data: String,
    /// 12-character nonce, used as raw UTF-8 bytes.
    pub nonce: String,
    /// Original resource type (notifications only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_type: Option<String>,
}

impl EncryptedResource {
    /// Open the envelope with the APIv3 key.
    pub fn decrypt(&self, key: &ApiV3Key) -> Result<Vec<u8>> {
        if !self.algorithm.is_empty() && self.algorithm != AEAD_ALGORITHM {
            return Err(WxPayError::Decrypt(format!(
                "unsupported algorithm {}",
                self.algorithm
            )));
        }
        Ok(key.decrypt(
            self.nonce.as_bytes(),
            self.associated_data.as_bytes(),
            &self.ciphertext,
        )?)
    }

    /// Seal `plaintext` into a new envelope.
    pub fn seal(key: &ApiV3Key, nonce: &str, associated_data: &str, plaintext: &[u8]) -> Result<Self> {
        let ciphertext = key.encrypt(nonce.as_bytes(), associated_data.as_bytes(), plaintext)?;
        Ok(Self {
            algorithm: AEAD_ALGORITHM.to_string(),
            ciphertext,
            associated_data: associated_data.to_string(),
            nonce: nonce.to_string(),
            original_type: None,
        })
    }
}

/// One entry of the certificate download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Serial number of the sealed certificate.
    pub serial_no: String,
    /// When the platform starts signing with this certificate.
    pub effective_time: DateTime<Utc>,
    /// When the platform stops accepting this certificate.
    pub expire_time: DateTime<Utc>,
    /// The PEM certificate sealed under the APIv3 key.
    pub encrypt_certificate: EncryptedResource,
}

impl CertificateRecord {
    /// Decrypt and parse the sealed certificate.
    ///
    /// The certificate's own serial must match `serial_no`.
    pub fn open(&self, key: &ApiV3Key) -> Result<PlatformCertificate> {
        let plaintext = self.encrypt_certificate.decrypt(key)?;
        let pem = std::str::from_utf8(&plaintext).map_err(|_| {
            WxPayError::invalid_data("encrypt_certificate", "certificate is not valid UTF-8")
        })?;

        PlatformCertificate::from_pem(
            pem,
            Some(&self.serial_no),
            self.effective_time,
            self.expire_time,
        )
    }
}

/// Body of the certificate download response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateList {
    /// Certificate records, newest last.
    #[serde(default)]
    pub data: Vec<CertificateRecord>,
}
