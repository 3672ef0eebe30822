//! RSA-OAEP for sensitive request fields.
//!
//! The platform's OAEP parameters use SHA-1 for both the label hash and MGF1.
//! Ciphertexts are base64 encoded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::{Result, WxPayError};

/// Encrypt `plaintext` under a platform public key.
///
/// OAEP is randomized: the same plaintext yields a different ciphertext on
/// every call. Empty plaintexts are allowed.
pub fn encrypt_oaep(public_key: &RsaPublicKey, plaintext: &str) -> Result<String> {
    let ciphertext = public_key
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), plaintext.as_bytes())
        .map_err(|e| WxPayError::Encrypt(e.to_string()))?;
    Ok(BASE64.encode(ciphertext))
}

/// Decrypt a base64 OAEP ciphertext with a private key.
///
/// Used for fields the platform returns encrypted under the merchant
/// certificate.
pub fn decrypt_oaep(private_key: &RsaPrivateKey, ciphertext_b64: &str) -> Result<String> {
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| WxPayError::Decrypt(format!("ciphertext is not valid base64: {}", e)))?;
    let plaintext = private_key
        .decrypt(Oaep::new::<Sha1>(), &ciphertext)
        .map_err(|e| WxPayError::Decrypt(e.to_string()))?;
    String::from_utf8(plaintext)
        .map_err(|_| WxPayError::Decrypt("plaintext is not valid UTF-8".to_string()))
}
