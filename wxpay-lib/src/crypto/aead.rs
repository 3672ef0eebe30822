//! AES-256-GCM under the merchant APIv3 key.
//!
//! The platform seals two kinds of payload with the APIv3 key: downloaded
//! platform certificates and notification resources. Both arrive as
//! `{associated_data, nonce, ciphertext}` where `nonce` and `associated_data`
//! are plain strings used byte-for-byte and `ciphertext` is base64 of
//! `ciphertext || tag`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the APIv3 key in bytes.
pub const API_V3_KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits for GCM).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// AEAD error types.
#[derive(Debug, thiserror::Error)]
pub enum AeadError {
    #[error("APIv3 key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("nonce must be 12 bytes, got {0}")]
    InvalidNonceLength(usize),
    #[error("ciphertext is not valid base64: {0}")]
    InvalidEncoding(String),
    #[error("ciphertext shorter than the authentication tag")]
    Truncated,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("encryption failed")]
    EncryptFailed,
}

impl From<AeadError> for crate::WxPayError {
    fn from(err: AeadError) -> Self {
        match err {
            AeadError::InvalidKeyLength(_) => Self::Configuration(err.to_string()),
            AeadError::EncryptFailed => Self::Encrypt(err.to_string()),
            _ => Self::Decrypt(err.to_string()),
        }
    }
}

/// The merchant's APIv3 key.
///
/// Exactly 32 bytes; the length is checked when the key is loaded so a bad
/// key surfaces as a configuration error at startup rather than on the first
/// notification. The bytes are wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiV3Key([u8; API_V3_KEY_SIZE]);

impl ApiV3Key {
    /// Build a key from its configured string form.
    pub fn new(key: &str) -> Result<Self, AeadError> {
        Self::from_bytes(key.as_bytes())
    }

    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AeadError> {
        let key: [u8; API_V3_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| AeadError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }

    /// Decrypt a base64 `ciphertext || tag` with the given nonce and AAD.
    pub fn decrypt(
        &self,
        nonce: &[u8],
        associated_data: &[u8],
        ciphertext_b64: &str,
    ) -> Result<Vec<u8>, AeadError> {
        let sealed = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| AeadError::InvalidEncoding(e.to_string()))?;
        self.open(nonce, associated_data, &sealed)
    }

    /// Decrypt raw `ciphertext || tag` bytes.
    pub fn open(
        &self,
        nonce: &[u8],
        associated_data: &[u8],
        sealed: &[u8],
    ) -> Result<Vec<u8>, AeadError> {
        if nonce.len() != NONCE_SIZE {
            return Err(AeadError::InvalidNonceLength(nonce.len()));
        }
        if sealed.len() < TAG_SIZE {
            return Err(AeadError::Truncated);
        }

        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: associated_data,
                },
            )
            .map_err(|_| AeadError::AuthenticationFailed)
    }

    /// Encrypt `plaintext`, returning base64 of `ciphertext || tag`.
    ///
    /// The platform is the only party that seals payloads in production;
    /// this exists for mock servers and test harnesses.
    pub fn encrypt(
        &self,
        nonce: &[u8],
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<String, AeadError> {
        if nonce.len() != NONCE_SIZE {
            return Err(AeadError::InvalidNonceLength(nonce.len()));
        }

        let sealed = self
            .cipher()
            .encrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| AeadError::EncryptFailed)?;
        Ok(BASE64.encode(sealed))
    }
}

impl std::fmt::Debug for ApiV3Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiV3Key(<redacted>)")
    }
}
