//! Error types for platform trust operations.
//!
//! Every failure the trust layer can produce maps onto one [`WxPayError`]
//! variant and a stable numeric [`WxPayErrorCode`]. Verification and
//! decryption failures are never retryable: a notification that fails either
//! must be rejected so the platform redelivers it.

use std::fmt;

/// Numeric error codes, grouped by family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WxPayErrorCode {
    /// Missing or malformed credential material
    Configuration = 1000,
    /// Transport/network layer error
    Transport = 2000,
    /// Connection failed
    ConnectionFailed = 2001,
    /// Connection timeout
    ConnectionTimeout = 2002,
    /// Platform returned an error response
    Api = 2100,
    /// AEAD or RSA-OAEP decryption failed
    Decrypt = 3000,
    /// RSA-OAEP encryption failed
    Encrypt = 3001,
    /// RSA signing failed
    Sign = 3002,
    /// A required verification header is absent
    MissingHeader = 4000,
    /// A verification header could not be parsed
    InvalidHeader = 4001,
    /// Timestamp outside the anti-replay window
    StaleTimestamp = 4002,
    /// Signature does not verify
    SignatureMismatch = 4003,
    /// No cached certificate matches the requested serial
    CertificateNotFound = 4004,
    /// Certificate cache expired and could not be refreshed
    CacheExhausted = 5000,
    /// Invalid request/data
    InvalidData = 6000,
    /// Serialization error
    Serialization = 6001,
    /// Internal/unexpected error
    Internal = 9999,
}

/// Error type for every trust-layer operation.
#[derive(Debug, Clone)]
pub enum WxPayError {
    /// Credential or configuration material is missing or malformed.
    Configuration(String),

    /// Transport/network layer error.
    Transport(String),

    /// Connection failed.
    ConnectionFailed {
        /// Target endpoint
        target: String,
        /// Underlying error message
        reason: String,
    },

    /// Connection timeout.
    ConnectionTimeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The platform answered with a non-success status.
    Api {
        /// HTTP status
        status: u16,
        /// Platform error code (e.g. `PARAM_ERROR`)
        code: String,
        /// Platform error message
        message: String,
        /// `Request-ID` response header, if present
        request_id: Option<String>,
    },

    /// Decryption failed (AEAD tag mismatch, wrong key, bad OAEP padding).
    Decrypt(String),

    /// RSA-OAEP encryption failed.
    Encrypt(String),

    /// RSA signing failed.
    Sign(String),

    /// A verification header is absent or empty.
    MissingHeader {
        /// Header name
        header: &'static str,
        /// `Request-ID` of the rejected message
        request_id: String,
    },

    /// A verification header is present but malformed.
    InvalidHeader {
        /// Header name
        header: &'static str,
        /// `Request-ID` of the rejected message
        request_id: String,
        /// Parse failure
        reason: String,
    },

    /// Timestamp is outside the anti-replay window.
    StaleTimestamp {
        /// Timestamp carried by the message (unix seconds)
        timestamp: i64,
        /// Local time at the check (unix seconds)
        now: i64,
        /// `Request-ID` of the rejected message
        request_id: String,
    },

    /// The signature does not verify under the resolved certificate.
    SignatureMismatch {
        /// Serial of the certificate used
        serial: String,
        /// `Request-ID` of the rejected message
        request_id: String,
    },

    /// No usable cached certificate carries the given serial.
    CertificateNotFound {
        /// Requested serial
        serial: String,
    },

    /// The cached certificates expired and the refresh failed.
    CacheExhausted {
        /// Why the refresh failed
        reason: String,
    },

    /// Invalid data provided.
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Serialization/deserialization error.
    Serialization(String),

    /// Internal/unexpected error.
    Internal(String),
}

impl WxPayError {
    /// Get the numeric error code.
    pub fn code(&self) -> WxPayErrorCode {
        match self {
            Self::Configuration(_) => WxPayErrorCode::Configuration,
            Self::Transport(_) => WxPayErrorCode::Transport,
            Self::ConnectionFailed { .. } => WxPayErrorCode::ConnectionFailed,
            Self::ConnectionTimeout { .. } => WxPayErrorCode::ConnectionTimeout,
            Self::Api { .. } => WxPayErrorCode::Api,
            Self::Decrypt(_) => WxPayErrorCode::Decrypt,
            Self::Encrypt(_) => WxPayErrorCode::Encrypt,
            Self::Sign(_) => WxPayErrorCode::Sign,
            Self::MissingHeader { .. } => WxPayErrorCode::MissingHeader,
            Self::InvalidHeader { .. } => WxPayErrorCode::InvalidHeader,
            Self::StaleTimestamp { .. } => WxPayErrorCode::StaleTimestamp,
            Self::SignatureMismatch { .. } => WxPayErrorCode::SignatureMismatch,
            Self::CertificateNotFound { .. } => WxPayErrorCode::CertificateNotFound,
            Self::CacheExhausted { .. } => WxPayErrorCode::CacheExhausted,
            Self::InvalidData { .. } => WxPayErrorCode::InvalidData,
            Self::Serialization(_) => WxPayErrorCode::Serialization,
            Self::Internal(_) => WxPayErrorCode::Internal,
        }
    }

    /// Get the error message as an owned String.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns true if this error is potentially recoverable by retrying.
    ///
    /// Only network-level failures and platform 429/5xx answers qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. } => {
                true
            }
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns a suggested retry delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Api { status: 429, .. } => Some(5000),
            Self::Api { status, .. } if *status >= 500 => Some(2000),
            Self::ConnectionTimeout { .. } => Some(1000),
            Self::ConnectionFailed { .. } => Some(2000),
            Self::Transport(_) => Some(1000),
            _ => None,
        }
    }

    /// Returns true for failures that mean an inbound message must be rejected.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader { .. }
                | Self::InvalidHeader { .. }
                | Self::StaleTimestamp { .. }
                | Self::SignatureMismatch { .. }
                | Self::CertificateNotFound { .. }
                | Self::CacheExhausted { .. }
                | Self::Decrypt(_)
        )
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing header error.
    pub fn missing_header(header: &'static str, request_id: impl Into<String>) -> Self {
        Self::MissingHeader {
            header,
            request_id: request_id.into(),
        }
    }
}

impl fmt::Display for WxPayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::ConnectionFailed { target, reason } => {
                write!(f, "connection to {} failed: {}", target, reason)
            }
            Self::ConnectionTimeout {
                operation,
                timeout_ms,
            } => {
                write!(f, "{} timed out after {}ms", operation, timeout_ms)
            }
            Self::Api {
                status,
                code,
                message,
                request_id,
            } => {
                write!(f, "platform error ({}) {}: {}", status, code, message)?;
                if let Some(id) = request_id {
                    write!(f, ", request-id=[{}]", id)?;
                }
                Ok(())
            }
            Self::Decrypt(msg) => write!(f, "decryption failed: {}", msg),
            Self::Encrypt(msg) => write!(f, "encryption failed: {}", msg),
            Self::Sign(msg) => write!(f, "signing failed: {}", msg),
            Self::MissingHeader { header, request_id } => {
                write!(
                    f,
                    "header `{}` is empty or missing, request-id=[{}]",
                    header, request_id
                )
            }
            Self::InvalidHeader {
                header,
                request_id,
                reason,
            } => {
                write!(
                    f,
                    "invalid `{}` header, request-id=[{}]: {}",
                    header, request_id, reason
                )
            }
            Self::StaleTimestamp {
                timestamp,
                now,
                request_id,
            } => {
                write!(
                    f,
                    "timestamp=[{}] outside replay window (now={}), request-id=[{}]",
                    timestamp, now, request_id
                )
            }
            Self::SignatureMismatch { serial, request_id } => {
                write!(
                    f,
                    "signature mismatch for serial=[{}], request-id=[{}]",
                    serial, request_id
                )
            }
            Self::CertificateNotFound { serial } => {
                write!(f, "no valid platform certificate for serial=[{}]", serial)
            }
            Self::CacheExhausted { reason } => {
                write!(
                    f,
                    "platform certificates expired and refresh failed: {}",
                    reason
                )
            }
            Self::InvalidData { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for WxPayError {}

impl From<serde_json::Error> for WxPayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
