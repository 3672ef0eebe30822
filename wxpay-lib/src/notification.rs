//! Notification decryption.
//!
//! Notification bodies carry their event payload in a `resource` envelope
//! sealed with AES-256-GCM under the APIv3 key. [`NotificationCodec::open`]
//! only accepts a [`VerifiedMessage`], so a body is never decrypted before
//! its platform signature has been checked.

use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::ApiV3Key;
use crate::platform::EncryptedResource;
use crate::verifier::VerifiedMessage;
use crate::{Result, WxPayError};

/// The JSON body of a notification, before decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// Notification ID.
    pub id: String,
    /// When the notification was created.
    pub create_time: DateTime<FixedOffset>,
    /// Event type, e.g. `TRANSACTION.SUCCESS`.
    pub event_type: String,
    /// Resource type, e.g. `encrypt-resource`.
    pub resource_type: String,
    /// Human readable summary.
    #[serde(default)]
    pub summary: String,
    /// The sealed payload.
    pub resource: EncryptedResource,
}

/// A verified, decrypted notification.
#[derive(Clone, Debug)]
pub struct Notification {
    /// The envelope the payload came from.
    pub envelope: NotificationEnvelope,
    plaintext: Vec<u8>,
}

impl Notification {
    /// Notification ID.
    pub fn id(&self) -> &str {
        &self.envelope.id
    }

    /// Event type.
    pub fn event_type(&self) -> &str {
        &self.envelope.event_type
    }

    /// Decrypted payload bytes.
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Deserialize the decrypted payload.
    pub fn content<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.plaintext)?)
    }

    /// The decrypted payload as a JSON object.
    pub fn content_map(&self) -> Result<Map<String, Value>> {
        match serde_json::from_slice::<Value>(&self.plaintext)? {
            Value::Object(map) => Ok(map),
            _ => Err(WxPayError::invalid_data(
                "resource",
                "notification payload is not a JSON object",
            )),
        }
    }
}

/// Decrypts notification payloads with the APIv3 key.
#[derive(Clone, Debug)]
pub struct NotificationCodec {
    key: ApiV3Key,
}

impl NotificationCodec {
    /// Create a codec.
    pub fn new(key: ApiV3Key) -> Self {
        Self { key }
    }

    /// Decrypt a sealed envelope.
    ///
    /// An authentication failure is always an error; the ciphertext is never
    /// returned in its place.
    pub fn decrypt(&self, envelope: &EncryptedResource) -> Result<Vec<u8>> {
        envelope.decrypt(&self.key)
    }

    /// Parse a verified notification body and decrypt its resource.
    pub fn open(&self, message: &VerifiedMessage) -> Result<Notification> {
        let envelope: NotificationEnvelope = message.json()?;
        let plaintext = self.decrypt(&envelope.resource).inspect_err(|err| {
            tracing::warn!(
                error = %err,
                notification_id = %envelope.id,
                request_id = message.request_id(),
                "failed to decrypt notification"
            );
        })?;

        Ok(Notification {
            envelope,
            plaintext,
        })
    }
}
