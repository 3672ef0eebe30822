//! Fixture keys, certificates and message builders.

use chrono::{DateTime, Utc};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;

use crate::credentials::{parse_private_key_pem, CredentialStore};
use crate::crypto::signer::response_message;
use crate::crypto::{ApiV3Key, Signer};
use crate::platform::{CertificateRecord, EncryptedResource};
use crate::verifier::{
    HEADER_NONCE, HEADER_REQUEST_ID, HEADER_SERIAL, HEADER_SIGNATURE, HEADER_TIMESTAMP,
};

/// Merchant private key (PKCS#8).
pub const MERCHANT_KEY_PEM: &str = include_str!("../../tests/fixtures/merchant_key.pem");
/// Merchant certificate.
pub const MERCHANT_CERT_PEM: &str = include_str!("../../tests/fixtures/merchant_cert.pem");
/// Serial of [`MERCHANT_CERT_PEM`].
pub const MERCHANT_SERIAL: &str = "3775B6A45ACD588826D15E583A95F5DD2C7A1B3C";

/// Platform private key (PKCS#1).
pub const PLATFORM_KEY_PEM: &str = include_str!("../../tests/fixtures/platform_key.pem");
/// Platform certificate.
pub const PLATFORM_CERT_PEM: &str = include_str!("../../tests/fixtures/platform_cert.pem");
/// Serial of [`PLATFORM_CERT_PEM`].
pub const PLATFORM_SERIAL: &str = "5157F09EFDC096DE15EBE81A47057A7232F0A7B1";

/// Key of the certificate that replaces [`PLATFORM_CERT_PEM`] on rotation (PKCS#8).
pub const PLATFORM_NEXT_KEY_PEM: &str = include_str!("../../tests/fixtures/platform_next_key.pem");
/// Certificate that replaces [`PLATFORM_CERT_PEM`] on rotation.
pub const PLATFORM_NEXT_CERT_PEM: &str =
    include_str!("../../tests/fixtures/platform_next_cert.pem");
/// Serial of [`PLATFORM_NEXT_CERT_PEM`].
pub const PLATFORM_NEXT_SERIAL: &str = "7132D72A5A3FB8B2E90C8B4A83C2C1A1F64B9E00";

/// APIv3 key shared by the fixtures.
pub const API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";

/// `Request-ID` set by [`signed_headers`].
pub const TEST_REQUEST_ID: &str = "req-1";

/// Nonce used when sealing fixture resources.
const SEAL_NONCE: &str = "61f9c719728a";

fn key(pem: &str) -> RsaPrivateKey {
    parse_private_key_pem(pem).expect("fixture key parses")
}

/// Merchant private key.
pub fn merchant_private_key() -> RsaPrivateKey {
    key(MERCHANT_KEY_PEM)
}

/// Merchant public key.
pub fn merchant_public_key() -> RsaPublicKey {
    RsaPublicKey::from(&merchant_private_key())
}

/// Platform private key.
pub fn platform_private_key() -> RsaPrivateKey {
    key(PLATFORM_KEY_PEM)
}

/// Signer holding the platform key.
pub fn platform_signer() -> Signer {
    Signer::new(platform_private_key())
}

/// Signer holding the rotated-in platform key.
pub fn platform_next_signer() -> Signer {
    Signer::new(key(PLATFORM_NEXT_KEY_PEM))
}

/// The fixture APIv3 key.
pub fn api_v3_key() -> ApiV3Key {
    ApiV3Key::new(API_V3_KEY).expect("fixture APIv3 key is 32 bytes")
}

/// Merchant credentials over the fixture keys.
pub fn credentials() -> CredentialStore {
    CredentialStore::new("1900000001", MERCHANT_SERIAL, merchant_private_key(), api_v3_key())
        .expect("fixture credentials are complete")
        .with_app_id("wx8888888888888888")
}

/// A certificate record sealed under the fixture APIv3 key.
pub fn sealed_record(
    pem: &str,
    serial: &str,
    effective_time: DateTime<Utc>,
    expire_time: DateTime<Utc>,
) -> CertificateRecord {
    CertificateRecord {
        serial_no: serial.to_string(),
        effective_time,
        expire_time,
        encrypt_certificate: EncryptedResource::seal(
            &api_v3_key(),
            SEAL_NONCE,
            "certificate",
            pem.as_bytes(),
        )
        .expect("sealing succeeds"),
    }
}

/// Signature headers for an inbound message, keyed by canonical header name.
pub fn signed_headers(
    signer: &Signer,
    serial: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
) -> HashMap<String, String> {
    let timestamp = timestamp.to_string();
    let signature = signer
        .sign_bytes(&response_message(&timestamp, nonce, body))
        .expect("signing succeeds");

    HashMap::from([
        (HEADER_SERIAL.to_string(), serial.to_string()),
        (HEADER_SIGNATURE.to_string(), signature),
        (HEADER_TIMESTAMP.to_string(), timestamp),
        (HEADER_NONCE.to_string(), nonce.to_string()),
        (HEADER_REQUEST_ID.to_string(), TEST_REQUEST_ID.to_string()),
    ])
}

/// A notification body whose resource seals `plaintext`.
pub fn notification_body(key: &ApiV3Key, event_type: &str, plaintext: &str) -> String {
    let resource = EncryptedResource {
        original_type: Some("transaction".to_string()),
        ..EncryptedResource::seal(key, "fdasflkja484", "transaction", plaintext.as_bytes())
            .expect("sealing succeeds")
    };

    serde_json::json!({
        "id": "EV-2018022511223320873",
        "create_time": "2015-05-20T13:29:35+08:00",
        "resource_type": "encrypt-resource",
        "event_type": event_type,
        "summary": "支付成功",
        "resource": resource,
    })
    .to_string()
}
