//! Inbound message verification.
//!
//! Notifications and API responses carry a platform signature over
//! `timestamp\nnonce\nbody\n` in the `Wechatpay-*` headers. Verification runs
//! in a fixed order and stops at the first failure:
//!
//! 1. all four signature headers are present and non-empty
//! 2. the timestamp is inside the anti-replay window
//! 3. a cached, unexpired certificate carries the header's serial
//! 4. the signature verifies under that certificate
//!
//! The freshness check needs no certificate, so stale or replayed messages
//! are rejected before the cache is touched.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::signer::response_message;
use crate::platform::{CacheEntry, PlatformCertificateCache};
use crate::transport::SignedResponse;
use crate::{Result, WxPayError};

/// Serial of the platform certificate that signed the message.
pub const HEADER_SERIAL: &str = "Wechatpay-Serial";
/// Base64 signature.
pub const HEADER_SIGNATURE: &str = "Wechatpay-Signature";
/// Unix timestamp in seconds.
pub const HEADER_TIMESTAMP: &str = "Wechatpay-Timestamp";
/// Random nonce.
pub const HEADER_NONCE: &str = "Wechatpay-Nonce";
/// Platform request ID, used for tracing rejected messages.
pub const HEADER_REQUEST_ID: &str = "Request-ID";

/// Read access to request or response headers.
///
/// Lookups are case-insensitive.
pub trait HeaderSource {
    /// The value of `name`, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderSource for HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// Everything needed to verify one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationContext {
    /// `Wechatpay-Serial`.
    pub serial: String,
    /// `Wechatpay-Signature`.
    pub signature: String,
    /// `Wechatpay-Timestamp`, exactly as received.
    pub timestamp: String,
    /// `Wechatpay-Nonce`.
    pub nonce: String,
    /// `Request-ID`, empty when absent.
    pub request_id: String,
    /// Raw body.
    pub body: Vec<u8>,
}

impl VerificationContext {
    /// Extract the signature headers.
    ///
    /// A missing or empty signature header is an error naming the header and
    /// the request ID, and is logged with that request ID.
    pub fn from_headers<H: HeaderSource + ?Sized>(
        headers: &H,
        body: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let request_id = headers.header(HEADER_REQUEST_ID).unwrap_or_default().to_string();
        let required = |name: &'static str| {
            headers
                .header(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    tracing::warn!(
                        request_id = %request_id,
                        header = name,
                        "rejected inbound message: missing signature header"
                    );
                    WxPayError::missing_header(name, request_id.clone())
                })
        };

        Ok(Self {
            serial: required(HEADER_SERIAL)?,
            signature: required(HEADER_SIGNATURE)?,
            timestamp: required(HEADER_TIMESTAMP)?,
            nonce: required(HEADER_NONCE)?,
            request_id,
            body: body.into(),
        })
    }

    /// The canonical message the signature covers.
    pub fn message(&self) -> Vec<u8> {
        response_message(&self.timestamp, &self.nonce, &self.body)
    }
}

/// Check the timestamp against the anti-replay window.
///
/// Fails when `|now - timestamp| >= max_skew_secs`.
pub(crate) fn check_freshness(
    context: &VerificationContext,
    now: DateTime<Utc>,
    max_skew_secs: u64,
) -> Result<i64> {
    let timestamp: i64 = context
        .timestamp
        .parse()
        .map_err(|e: std::num::ParseIntError| WxPayError::InvalidHeader {
            header: HEADER_TIMESTAMP,
            request_id: context.request_id.clone(),
            reason: e.to_string(),
        })?;

    let now = now.timestamp();
    let skew = now.saturating_sub(timestamp).saturating_abs();
    if skew >= i64::try_from(max_skew_secs).unwrap_or(i64::MAX) {
        return Err(WxPayError::StaleTimestamp {
            timestamp,
            now,
            request_id: context.request_id.clone(),
        });
    }
    Ok(timestamp)
}

/// Check the signature against the certificate named by the serial header.
///
/// Only certificates that have not reached `not_after` are considered.
pub(crate) fn check_signature(
    entry: &CacheEntry,
    context: &VerificationContext,
    now: DateTime<Utc>,
) -> Result<()> {
    let cert = entry
        .get(&context.serial)
        .filter(|cert| cert.is_unexpired_at(now))
        .ok_or_else(|| WxPayError::CertificateNotFound {
            serial: context.serial.clone(),
        })?;

    match cert.verify(&context.message(), &context.signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(WxPayError::SignatureMismatch {
            serial: context.serial.clone(),
            request_id: context.request_id.clone(),
        }),
        Err(err) => Err(WxPayError::InvalidHeader {
            header: HEADER_SIGNATURE,
            request_id: context.request_id.clone(),
            reason: err.to_string(),
        }),
    }
}

/// A message whose platform signature has been checked.
///
/// Only [`Verifier`] can build one, so code that takes `&VerifiedMessage`
/// cannot be handed an unverified body.
#[derive(Clone, Debug)]
pub struct VerifiedMessage {
    serial: String,
    request_id: String,
    timestamp: i64,
    nonce: String,
    body: Vec<u8>,
}

impl VerifiedMessage {
    /// Serial of the certificate that signed the message.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// `Request-ID` header, possibly empty.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Signed timestamp (unix seconds).
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Signed nonce.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Verified body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Deserialize the verified body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Take the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Verifies inbound messages against the platform certificate cache.
#[derive(Clone, Debug)]
pub struct Verifier {
    cache: Arc<PlatformCertificateCache>,
}

impl Verifier {
    /// Create a verifier over a cache.
    pub fn new(cache: Arc<PlatformCertificateCache>) -> Self {
        Self { cache }
    }

    /// Verify a message given its headers and raw body.
    pub async fn verify<H: HeaderSource + ?Sized>(
        &self,
        headers: &H,
        body: &[u8],
    ) -> Result<VerifiedMessage> {
        let context = VerificationContext::from_headers(headers, body)?;
        self.verify_context(context).await
    }

    /// Verify a signed platform response.
    pub async fn verify_response(&self, response: &SignedResponse) -> Result<VerifiedMessage> {
        self.verify(&response.headers, &response.body).await
    }

    /// Verify an already extracted context at the cache's current time.
    pub async fn verify_context(&self, context: VerificationContext) -> Result<VerifiedMessage> {
        let now = self.cache.clock().now();
        self.verify_at(context, now).await
    }

    /// Verify an already extracted context at an explicit time.
    #[tracing::instrument(skip_all, fields(request_id = %context.request_id, serial = %context.serial))]
    pub async fn verify_at(
        &self,
        context: VerificationContext,
        now: DateTime<Utc>,
    ) -> Result<VerifiedMessage> {
        let result = self.check(&context, now).await;
        match result {
            Ok(timestamp) => Ok(VerifiedMessage {
                serial: context.serial,
                request_id: context.request_id,
                timestamp,
                nonce: context.nonce,
                body: context.body,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "rejected inbound message");
                Err(err)
            }
        }
    }

    async fn check(&self, context: &VerificationContext, now: DateTime<Utc>) -> Result<i64> {
        let timestamp = check_freshness(context, now, self.cache.max_clock_skew_secs())?;
        let entry = self.cache.entry().await?;
        check_signature(&entry, context, now)?;
        Ok(timestamp)
    }
}
