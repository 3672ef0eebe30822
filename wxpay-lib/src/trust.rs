//! The trust capability handed to endpoint clients.
//!
//! Endpoint glue (payments, refunds, onboarding) needs four things from the
//! trust layer: sign, encrypt, verify, and open notifications. They receive
//! them through [`TrustManager`], injected at construction.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wxpay_lib::{MerchantConfig, PlatformTrustManager, TrustManager};
//!
//! let config = MerchantConfig::from_env()?;
//! let trust = Arc::new(PlatformTrustManager::from_config(&config)?);
//! let _refresher = trust.start_background_refresh();
//!
//! // In the webhook handler:
//! let notification = trust.verify_notification(&headers, &body).await?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MerchantConfig, DEFAULT_REFRESH_INTERVAL_SECS};
use crate::credentials::CredentialStore;
use crate::encryptor::{EncryptedField, Encryptor};
use crate::notification::{Notification, NotificationCodec};
use crate::platform::{
    CertificateSource, HttpCertificateSource, PlatformCertificateCache, RefreshHandle,
};
use crate::transport::SignedTransport;
use crate::verifier::{HeaderSource, VerificationContext, VerifiedMessage, Verifier};
use crate::Result;

/// Sign, encrypt and verify on behalf of endpoint clients.
#[async_trait]
pub trait TrustManager: Send + Sync {
    /// Sign `message` with the merchant key, returning base64.
    fn sign(&self, message: &str) -> Result<String>;

    /// Encrypt a sensitive field under the platform's current certificate.
    async fn encrypt(&self, plaintext: &str) -> Result<EncryptedField>;

    /// Verify an inbound message.
    async fn verify(&self, context: VerificationContext) -> Result<VerifiedMessage>;

    /// Decrypt the resource of a verified notification.
    fn open_notification(&self, message: &VerifiedMessage) -> Result<Notification>;

    /// Verify a notification and decrypt its resource.
    async fn verify_notification(
        &self,
        headers: &(dyn HeaderSource + Sync),
        body: &[u8],
    ) -> Result<Notification> {
        let context = VerificationContext::from_headers(headers, body)?;
        let message = self.verify(context).await?;
        self.open_notification(&message)
    }
}

/// [`TrustManager`] backed by the platform certificate cache.
#[derive(Clone, Debug)]
pub struct PlatformTrustManager {
    credentials: Arc<CredentialStore>,
    cache: Arc<PlatformCertificateCache>,
    verifier: Verifier,
    encryptor: Encryptor,
    codec: NotificationCodec,
    refresh_interval: Duration,
}

impl PlatformTrustManager {
    /// Compose a trust manager from its parts.
    pub fn new(credentials: Arc<CredentialStore>, cache: Arc<PlatformCertificateCache>) -> Self {
        Self {
            codec: NotificationCodec::new(credentials.api_v3_key().clone()),
            verifier: Verifier::new(Arc::clone(&cache)),
            encryptor: Encryptor::new(Arc::clone(&cache)),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            credentials,
            cache,
        }
    }

    /// Build credentials, transport and certificate cache from configuration.
    pub fn from_config(config: &MerchantConfig) -> Result<Self> {
        let credentials = Arc::new(CredentialStore::from_config(config)?);
        let transport = SignedTransport::new(config, Arc::clone(&credentials))?;
        Ok(Self::with_source(
            credentials,
            Arc::new(HttpCertificateSource::new(transport)),
            config,
        ))
    }

    /// Build a trust manager over an explicit certificate source, tuned by `config`.
    pub fn with_source(
        credentials: Arc<CredentialStore>,
        source: Arc<dyn CertificateSource>,
        config: &MerchantConfig,
    ) -> Self {
        let cache = PlatformCertificateCache::new(source, credentials.api_v3_key().clone())
            .with_expiry_margin(config.expiry_margin_secs)
            .with_max_clock_skew(config.max_clock_skew_secs);
        Self::new(credentials, Arc::new(cache)).with_refresh_interval(config.refresh_interval())
    }

    /// Set the proactive refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Merchant credentials.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// The certificate cache.
    pub fn cache(&self) -> &Arc<PlatformCertificateCache> {
        &self.cache
    }

    /// The verifier.
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// The encryptor.
    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    /// Start refreshing platform certificates in the background.
    ///
    /// Keep the handle alive for as long as refreshing should continue.
    pub fn start_background_refresh(&self) -> RefreshHandle {
        tracing::info!(
            interval_secs = self.refresh_interval.as_secs(),
            "starting background platform certificate refresh"
        );
        self.cache.spawn_refresher(self.refresh_interval)
    }
}

#[async_trait]
impl TrustManager for PlatformTrustManager {
    fn sign(&self, message: &str) -> Result<String> {
        self.credentials.sign(message)
    }

    async fn encrypt(&self, plaintext: &str) -> Result<EncryptedField> {
        self.encryptor.encrypt(plaintext).await
    }

    async fn verify(&self, context: VerificationContext) -> Result<VerifiedMessage> {
        self.verifier.verify_context(context).await
    }

    fn open_notification(&self, message: &VerifiedMessage) -> Result<Notification> {
        self.codec.open(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeySource;
    use crate::test_utils::{
        api_v3_key, credentials, notification_body, platform_signer, sealed_record, signed_headers,
        FakeCertificateSource, Step, API_V3_KEY, MERCHANT_KEY_PEM, PLATFORM_CERT_PEM,
        PLATFORM_SERIAL, TEST_REQUEST_ID,
    };
    use crate::WxPayError;
    use chrono::{Duration as ChronoDuration, Utc};

    fn manager() -> (PlatformTrustManager, Arc<FakeCertificateSource>) {
        let now = Utc::now();
        let source = Arc::new(FakeCertificateSource::new(vec![Step::Records(vec![
            sealed_record(
                PLATFORM_CERT_PEM,
                PLATFORM_SERIAL,
                now - ChronoDuration::days(1),
                now + ChronoDuration::days(30),
            ),
        ])]));
        let config = MerchantConfig::new(
            "1900000001",
            API_V3_KEY,
            KeySource::Pem(MERCHANT_KEY_PEM.to_string()),
        );
        let manager =
            PlatformTrustManager::with_source(Arc::new(credentials()), source.clone(), &config);
        (manager, source)
    }

    #[tokio::test]
    async fn test_verify_notification_through_trait_object() {
        let (manager, source) = manager();
        let trust: Arc<dyn TrustManager> = Arc::new(manager);

        let body = notification_body(
            &api_v3_key(),
            "TRANSACTION.SUCCESS",
            r#"{"out_trade_no":"T1"}"#,
        );
        let headers = signed_headers(
            &platform_signer(),
            PLATFORM_SERIAL,
            Utc::now().timestamp(),
            "n1",
            body.as_bytes(),
        );

        let notification = trust
            .verify_notification(&headers, body.as_bytes())
            .await
            .unwrap();
        assert_eq!(notification.content_map().unwrap()["out_trade_no"], "T1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_unverified_notification_is_not_opened() {
        let (manager, _) = manager();
        let body = notification_body(&api_v3_key(), "TRANSACTION.SUCCESS", "{}");
        let mut headers = signed_headers(
            &platform_signer(),
            PLATFORM_SERIAL,
            Utc::now().timestamp(),
            "n1",
            body.as_bytes(),
        );
        headers.insert("Wechatpay-Nonce".to_string(), "n2".to_string());

        let err = manager
            .verify_notification(&headers, body.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, WxPayError::SignatureMismatch { .. }));
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_missing_header_rejection_is_logged_with_request_id() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (manager, source) = manager();
        let body = notification_body(&api_v3_key(), "TRANSACTION.SUCCESS", "{}");
        let mut headers = signed_headers(
            &platform_signer(),
            PLATFORM_SERIAL,
            Utc::now().timestamp(),
            "n1",
            body.as_bytes(),
        );
        headers.remove("Wechatpay-Timestamp");

        let err = manager
            .verify_notification(&headers, body.as_bytes())
            .await
            .unwrap_err();

        assert!(matches!(err, WxPayError::MissingHeader { .. }));
        assert_eq!(source.calls(), 0);
        let output = logs.contents();
        assert!(output.contains("rejected inbound message"), "{}", output);
        assert!(output.contains(TEST_REQUEST_ID), "{}", output);
        assert!(output.contains("Wechatpay-Timestamp"), "{}", output);
    }

    #[tokio::test]
    async fn test_encrypt_reports_serial() {
        let (manager, _) = manager();
        let field = manager.encrypt("13800138000").await.unwrap();
        assert_eq!(field.serial_no, PLATFORM_SERIAL);
    }

    #[test]
    fn test_sign_uses_merchant_key() {
        let (manager, _) = manager();
        let signature = manager.sign("message\n").unwrap();
        assert_eq!(signature, credentials().sign("message\n").unwrap());
    }

    #[tokio::test]
    async fn test_background_refresh_handle() {
        let (manager, source) = manager();
        let manager = manager.with_refresh_interval(std::time::Duration::from_millis(20));

        let handle = manager.start_background_refresh();
        tokio::time::sleep(std::time::Duration::from_millis(70)).await;
        handle.stop();

        assert!(source.calls() >= 2);
    }
}
