//! Verified JSON calls for endpoint clients.
//!
//! Every response is checked against the platform signature before its body
//! is parsed.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::config::MerchantConfig;
use crate::credentials::CredentialStore;
use crate::encryptor::EncryptedField;
use crate::platform::HttpCertificateSource;
use crate::transport::SignedTransport;
use crate::trust::{PlatformTrustManager, TrustManager};
use crate::verifier::{VerificationContext, VerifiedMessage, HEADER_SERIAL};
use crate::{Result, WxPayError};

/// Signed, verified JSON client.
#[derive(Clone)]
pub struct ApiClient {
    transport: SignedTransport,
    trust: Arc<dyn TrustManager>,
}

impl ApiClient {
    /// Create a client from a transport and an injected trust manager.
    pub fn new(transport: SignedTransport, trust: Arc<dyn TrustManager>) -> Self {
        Self { transport, trust }
    }

    /// Build the client and a [`PlatformTrustManager`] sharing one set of credentials.
    ///
    /// The trust manager is returned too so the caller can start background
    /// refresh and verify notifications with it.
    pub fn from_config(config: &MerchantConfig) -> Result<(Self, Arc<PlatformTrustManager>)> {
        let credentials = Arc::new(CredentialStore::from_config(config)?);
        let transport = SignedTransport::new(config, Arc::clone(&credentials))?;
        let trust = Arc::new(PlatformTrustManager::with_source(
            credentials,
            Arc::new(HttpCertificateSource::new(transport.clone())),
            config,
        ));

        Ok((Self::new(transport, trust.clone()), trust))
    }

    /// The injected trust manager.
    pub fn trust_manager(&self) -> &Arc<dyn TrustManager> {
        &self.trust
    }

    /// The underlying transport.
    pub fn transport(&self) -> &SignedTransport {
        &self.transport
    }

    /// Encrypt a sensitive field for a request body.
    pub async fn encrypt(&self, plaintext: &str) -> Result<EncryptedField> {
        self.trust.encrypt(plaintext).await
    }

    /// Send a signed request and verify the response signature.
    pub async fn execute(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&str>,
        extra_headers: &[(&'static str, String)],
    ) -> Result<VerifiedMessage> {
        let response = self
            .transport
            .send(method, path_and_query, body, extra_headers)
            .await?;
        let context = VerificationContext::from_headers(&response.headers, response.body)?;
        self.trust.verify(context).await
    }

    /// GET and parse a verified JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        self.execute(Method::GET, path_and_query, None, &[])
            .await?
            .json()
    }

    /// POST a JSON body and parse the verified JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_json(body)?;
        self.execute(Method::POST, path, Some(&body), &[])
            .await?
            .json()
    }

    /// POST a body whose sensitive fields were encrypted under `platform_serial`.
    ///
    /// Sets `Wechatpay-Serial` so the platform decrypts with the matching key.
    pub async fn post_json_with_encrypted_fields<B, T>(
        &self,
        path: &str,
        body: &B,
        platform_serial: &str,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if platform_serial.is_empty() {
            return Err(WxPayError::invalid_data(
                "platform_serial",
                "encrypted request without a platform certificate serial",
            ));
        }

        let body = to_json(body)?;
        self.execute(
            Method::POST,
            path,
            Some(&body),
            &[(HEADER_SERIAL, platform_serial.to_string())],
        )
        .await?
        .json()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<String> {
    Ok(serde_json::to_string(body)?)
}
