//! Merchant-side trust layer for the WeChat Pay APIv3 signed API.
//!
//! Endpoint clients (payments, refunds, onboarding) are plain JSON glue. What
//! they need from this crate is a way to trust the platform and be trusted by
//! it:
//!
//! - **Credentials**: the merchant private key, certificate serial and APIv3 key
//! - **Signing**: `Authorization` headers and client-invocation signatures
//! - **Platform certificates**: downloaded, decrypted, cached until shortly
//!   before expiry, refreshed lazily and in the background
//! - **Verification**: inbound notifications and responses, with an
//!   anti-replay window
//! - **Encryption**: RSA-OAEP for sensitive request fields
//! - **Notifications**: AES-256-GCM resource decryption after verification
//!
//! # Example
//!
//! ```rust,ignore
//! use wxpay_lib::prelude::*;
//!
//! let config = MerchantConfig::from_env()?;
//! let (client, trust) = ApiClient::from_config(&config)?;
//! let _refresher = trust.start_background_refresh();
//!
//! // Outbound: encrypted fields carry the serial of the certificate used.
//! let name = client.encrypt("张三").await?;
//! let body = serde_json::json!({ "name": name.ciphertext });
//! let reply: serde_json::Value = client
//!     .post_json_with_encrypted_fields("/v3/applyment4sub/applyment/", &body, &name.serial_no)
//!     .await?;
//!
//! // Inbound: verify first, then decrypt.
//! let notification = trust.verify_notification(&headers, &body_bytes).await?;
//! let content = notification.content_map()?;
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod encryptor;
pub mod errors;
pub mod jsapi;
pub mod notification;
pub mod platform;
pub mod prelude;
pub mod transport;
pub mod trust;
pub mod verifier;

/// Test utilities for trust-layer testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::ApiClient;
pub use clock::{Clock, SystemClock};
pub use config::{KeySource, MerchantConfig};
pub use credentials::CredentialStore;
pub use crypto::{ApiV3Key, Signer};
pub use encryptor::{EncryptedField, Encryptor};
pub use errors::{WxPayError, WxPayErrorCode};
pub use jsapi::JsapiPayParams;
pub use notification::{Notification, NotificationCodec, NotificationEnvelope};
pub use platform::{
    CacheEntry, CertificateDownload, CertificateSource, HttpCertificateSource,
    PlatformCertificate, PlatformCertificateCache, RefreshHandle,
};
pub use transport::{SignedResponse, SignedTransport};
pub use trust::{PlatformTrustManager, TrustManager};
pub use verifier::{HeaderSource, VerificationContext, VerifiedMessage, Verifier};

/// Common result alias for trust-layer operations.
pub type Result<T> = std::result::Result<T, WxPayError>;
