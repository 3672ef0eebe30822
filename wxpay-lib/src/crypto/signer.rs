//! SHA256-with-RSA signatures and the canonical strings they cover.
//!
//! Outbound requests sign `method\nurl\ntimestamp\nnonce\nbody\n`, inbound
//! messages are verified over `timestamp\nnonce\nbody\n`, and client-side
//! payment invocation signs `appId\ntimeStamp\nnonceStr\npackage\n`. The
//! delimiters and ordering are fixed by the platform.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::distributions::{Alphanumeric, DistString};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::sync::Arc;

use crate::{Result, WxPayError};

/// Authorization scheme for merchant-signed requests.
pub const AUTH_SCHEME: &str = "WECHATPAY2-SHA256-RSA2048";

/// Length of generated nonces.
const NONCE_LEN: usize = 32;

/// Build the outbound canonical string `method\nurl\ntimestamp\nnonce\nbody\n`.
///
/// `url` is the request path including the query string.
pub fn request_message(method: &str, url: &str, timestamp: i64, nonce: &str, body: &str) -> String {
    format!("{}\n{}\n{}\n{}\n{}\n", method, url, timestamp, nonce, body)
}

/// Build the inbound canonical message `timestamp\nnonce\nbody\n` as bytes.
///
/// The body is copied verbatim; it is not required to be UTF-8.
pub fn response_message(timestamp: &str, nonce: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + nonce.len() + body.len() + 3);
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(nonce.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(body);
    message.push(b'\n');
    message
}

/// Build the client-invocation string `appId\ntimeStamp\nnonceStr\npackage\n`.
pub fn pay_message(app_id: &str, timestamp: i64, nonce: &str, package: &str) -> String {
    format!("{}\n{}\n{}\n{}\n", app_id, timestamp, nonce, package)
}

/// Generate a random alphanumeric nonce.
pub fn generate_nonce() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), NONCE_LEN)
}

/// RSA-SHA256 signer over the merchant private key.
///
/// Cheap to clone; the key is shared read-only.
#[derive(Clone)]
pub struct Signer {
    key: Arc<SigningKey<Sha256>>,
}

impl Signer {
    /// Create a signer from a private key.
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            key: Arc::new(SigningKey::<Sha256>::new(private_key)),
        }
    }

    /// Sign the exact UTF-8 bytes of `message`, returning base64.
    pub fn sign(&self, message: &str) -> Result<String> {
        self.sign_bytes(message.as_bytes())
    }

    /// Sign raw bytes, returning base64.
    pub fn sign_bytes(&self, message: &[u8]) -> Result<String> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|e| WxPayError::Sign(e.to_string()))?;
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// Build the `Authorization` header value for an outbound request.
    #[allow(clippy::too_many_arguments)]
    pub fn authorization(
        &self,
        merchant_id: &str,
        serial_no: &str,
        method: &str,
        url: &str,
        timestamp: i64,
        nonce: &str,
        body: &str,
    ) -> Result<String> {
        let signature = self.sign(&request_message(method, url, timestamp, nonce, body))?;
        Ok(format!(
            "{} mchid=\"{}\",nonce_str=\"{}\",signature=\"{}\",timestamp=\"{}\",serial_no=\"{}\"",
            AUTH_SCHEME, merchant_id, nonce, signature, timestamp, serial_no
        ))
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signer(<redacted>)")
    }
}

/// Check a base64 SHA256-with-RSA signature over `message`.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// an error only when the signature is not decodable.
pub fn verify_signature(
    public_key: &RsaPublicKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<bool> {
    let raw = BASE64
        .decode(signature_b64)
        .map_err(|e| WxPayError::invalid_data("signature", format!("not base64: {}", e)))?;
    let signature = match Signature::try_from(raw.as_slice()) {
        Ok(signature) => signature,
        Err(_) => return Ok(false),
    };

    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    Ok(verifying_key.verify(message, &signature).is_ok())
}
