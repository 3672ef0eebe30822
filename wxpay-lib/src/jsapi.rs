//! Client-side payment invocation parameters.

use serde::{Deserialize, Serialize};

use crate::crypto::signer::{generate_nonce, pay_message};
use crate::crypto::Signer;
use crate::{Result, WxPayError};

/// Signature type the client must be told about.
pub const SIGN_TYPE_RSA: &str = "RSA";

/// Parameters a JSAPI / mini-program client passes to `requestPayment`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsapiPayParams {
    /// Application ID.
    pub app_id: String,
    /// Unix timestamp in seconds, as a string.
    pub time_stamp: String,
    /// Random nonce.
    pub nonce_str: String,
    /// `prepay_id=<id>`.
    pub package: String,
    /// Always `RSA`.
    pub sign_type: String,
    /// Signature over `appId\ntimeStamp\nnonceStr\npackage\n`.
    pub pay_sign: String,
}

impl JsapiPayParams {
    /// Sign invocation parameters for `prepay_id` with a fresh nonce and the current time.
    pub fn sign(signer: &Signer, app_id: &str, prepay_id: &str) -> Result<Self> {
        Self::sign_at(
            signer,
            app_id,
            prepay_id,
            chrono::Utc::now().timestamp(),
            &generate_nonce(),
        )
    }

    /// Sign invocation parameters with an explicit timestamp and nonce.
    pub fn sign_at(
        signer: &Signer,
        app_id: &str,
        prepay_id: &str,
        timestamp: i64,
        nonce: &str,
    ) -> Result<Self> {
        if app_id.is_empty() {
            return Err(WxPayError::config("app id is required for payment invocation"));
        }
        if prepay_id.is_empty() {
            return Err(WxPayError::invalid_data("prepay_id", "prepay_id is empty"));
        }

        let package = format!("prepay_id={}", prepay_id);
        let pay_sign = signer.sign(&pay_message(app_id, timestamp, nonce, &package))?;

        Ok(Self {
            app_id: app_id.to_string(),
            time_stamp: timestamp.to_string(),
            nonce_str: nonce.to_string(),
            package,
            sign_type: SIGN_TYPE_RSA.to_string(),
            pay_sign,
        })
    }
}
