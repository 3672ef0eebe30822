//! Shared fixtures for the integration tests.
//!
//! Keys, certificates, the manual clock and the scripted certificate source
//! come from the crate's `test_utils` module (enabled through the
//! `test-utils` feature on the self dev-dependency). What is left here builds
//! configuration-backed values the way an application would.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;

use wxpay_lib::platform::CertificateRecord;
use wxpay_lib::{CredentialStore, KeySource, MerchantConfig};

pub use wxpay_lib::test_utils::{
    api_v3_key, platform_next_signer, platform_signer, sealed_record, signed_headers,
    FakeCertificateSource, ManualClock, Step, API_V3_KEY, MERCHANT_CERT_PEM, MERCHANT_KEY_PEM,
    MERCHANT_SERIAL, PLATFORM_CERT_PEM, PLATFORM_KEY_PEM, PLATFORM_NEXT_CERT_PEM,
    PLATFORM_NEXT_SERIAL, PLATFORM_SERIAL,
};

pub const MERCHANT_ID: &str = "1900000001";

pub fn merchant_config() -> MerchantConfig {
    MerchantConfig::new(
        MERCHANT_ID,
        API_V3_KEY,
        KeySource::Pem(MERCHANT_KEY_PEM.to_string()),
    )
    .with_merchant_cert(KeySource::Pem(MERCHANT_CERT_PEM.to_string()))
    .with_app_id("wx8888888888888888")
}

/// Credentials loaded through [`merchant_config`].
pub fn credentials() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::from_config(&merchant_config()).unwrap())
}

/// A record valid from yesterday for `days` more days.
pub fn record(pem: &str, serial: &str, days: i64) -> CertificateRecord {
    let now = Utc::now();
    sealed_record(pem, serial, now - Duration::days(1), now + Duration::days(days))
}

/// A source that serves `records` on every download.
pub fn serving(records: Vec<CertificateRecord>) -> FakeCertificateSource {
    FakeCertificateSource::new(vec![Step::Records(records)])
}

/// The step a source repeats while the platform is down.
pub fn unreachable() -> Step {
    Step::Fail("platform unreachable".to_string())
}

/// A `TRANSACTION.SUCCESS` notification sealing `plaintext` under the fixture key.
pub fn notification_body(plaintext: &str) -> String {
    wxpay_lib::test_utils::notification_body(&api_v3_key(), "TRANSACTION.SUCCESS", plaintext)
}
