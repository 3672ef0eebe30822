//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use wxpay_lib::prelude::*;
//! ```

// Error handling
pub use crate::errors::{WxPayError, WxPayErrorCode};
pub use crate::Result;

// Configuration and credentials
pub use crate::config::{KeySource, MerchantConfig};
pub use crate::credentials::CredentialStore;

// Trust capability
pub use crate::client::ApiClient;
pub use crate::encryptor::EncryptedField;
pub use crate::notification::Notification;
pub use crate::trust::{PlatformTrustManager, TrustManager};
pub use crate::verifier::{HeaderSource, VerifiedMessage};

// Client invocation
pub use crate::jsapi::JsapiPayParams;
