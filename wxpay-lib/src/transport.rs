//! Authenticated HTTP transport.
//!
//! Every request carries a merchant `Authorization` header computed over
//! `method\npath\ntimestamp\nnonce\nbody\n`. Responses are returned raw so
//! the caller can verify the platform signature over the exact body bytes
//! before parsing anything.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MerchantConfig;
use crate::credentials::CredentialStore;
use crate::crypto::generate_nonce;
use crate::verifier::HEADER_REQUEST_ID;
use crate::{Result, WxPayError};

const USER_AGENT_VALUE: &str = concat!("wxpay-lib/", env!("CARGO_PKG_VERSION"));

/// A raw response from the platform.
#[derive(Clone, Debug)]
pub struct SignedResponse {
    /// HTTP status.
    pub status: u16,
    /// Response headers, including the `Wechatpay-*` signature headers.
    pub headers: HeaderMap,
    /// Body bytes exactly as received.
    pub body: Vec<u8>,
}

impl SignedResponse {
    /// The `Request-ID` header, or an empty string.
    pub fn request_id(&self) -> &str {
        self.headers
            .get(HEADER_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            WxPayError::Serialization(format!("failed to parse platform response: {}", e))
        })
    }
}

/// Platform error body.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// HTTP client that signs every request with the merchant key.
#[derive(Clone)]
pub struct SignedTransport {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    credentials: Arc<CredentialStore>,
}

impl SignedTransport {
    /// Create a transport from the merchant configuration.
    pub fn new(config: &MerchantConfig, credentials: Arc<CredentialStore>) -> Result<Self> {
        Self::with_base_url(&config.api_base_url, config.timeout_secs, credentials)
    }

    /// Create a transport against an explicit base URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout_secs: u64,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WxPayError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_secs,
            credentials,
        })
    }

    /// Merchant credentials used for signing.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path_and_query: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path_and_query.trim_start_matches('/')
        )
    }

    /// Send a signed request.
    ///
    /// `path_and_query` is signed exactly as given and must start with `/`.
    /// Non-2xx answers become [`WxPayError::Api`].
    #[tracing::instrument(skip(self, body, extra_headers), fields(merchant_id = %self.credentials.merchant_id()))]
    pub async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&str>,
        extra_headers: &[(&'static str, String)],
    ) -> Result<SignedResponse> {
        if !path_and_query.starts_with('/') {
            return Err(WxPayError::invalid_data(
                "path",
                format!("{} must start with '/'", path_and_query),
            ));
        }

        let body = body.unwrap_or_default();
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = generate_nonce();
        let authorization = self.credentials.signer().authorization(
            self.credentials.merchant_id(),
            self.credentials.serial_no(),
            method.as_str(),
            path_and_query,
            timestamp,
            &nonce,
            body,
        )?;
        tracing::debug!(%nonce, timestamp, "signed outbound request");

        let mut request = self
            .client
            .request(method, self.url(path_and_query))
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if !body.is_empty() {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.to_string());
        }
        for (name, value) in extra_headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?
            .to_vec();

        let response = SignedResponse {
            status,
            headers,
            body,
        };
        if !(200..300).contains(&status) {
            return Err(map_status_error(&response));
        }
        Ok(response)
    }

    /// Map reqwest errors to WxPayError.
    fn map_reqwest_error(&self, e: reqwest::Error) -> WxPayError {
        if e.is_timeout() {
            WxPayError::ConnectionTimeout {
                operation: "platform request".to_string(),
                timeout_ms: self.timeout_secs * 1000,
            }
        } else if e.is_connect() {
            WxPayError::ConnectionFailed {
                target: self.base_url.clone(),
                reason: e.to_string(),
            }
        } else {
            WxPayError::Transport(format!("platform request failed: {}", e))
        }
    }
}

impl std::fmt::Debug for SignedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTransport")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Map a non-success response to WxPayError.
fn map_status_error(response: &SignedResponse) -> WxPayError {
    let parsed: ApiErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    let request_id = Some(response.request_id())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let message = if parsed.message.is_empty() {
        String::from_utf8_lossy(&response.body).into_owned()
    } else {
        parsed.message
    };

    WxPayError::Api {
        status: response.status,
        code: parsed.code,
        message,
        request_id,
    }
}
