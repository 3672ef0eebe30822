//! End-to-end notification verification through the public API.
//!
//! Property tests flip single bytes of every signed input and check that
//! verification never succeeds on the altered message.

mod common;

use chrono::{Duration, Utc};
use common::*;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::HashMap;
use std::sync::Arc;
use wxpay_lib::{
    Notification, PlatformCertificateCache, PlatformTrustManager, Result, TrustManager,
    VerificationContext, WxPayErrorCode,
};

const TRANSACTION: &str = r#"{"mchid":"1900000001","appid":"wx8888888888888888","out_trade_no":"1217752501201407033233368018","transaction_id":"4200000985202103031441826014","trade_state":"SUCCESS","amount":{"total":100,"currency":"CNY"}}"#;
const NONCE: &str = "5K8264ILTKCH16CQ2502SI8ZNMTM67VS";

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn trust_manager() -> (PlatformTrustManager, Arc<FakeCertificateSource>) {
    let source = Arc::new(serving(vec![record(PLATFORM_CERT_PEM, PLATFORM_SERIAL, 30)]));
    let trust = PlatformTrustManager::with_source(credentials(), source.clone(), &merchant_config());
    (trust, source)
}

fn signed_notification(timestamp: i64) -> (HashMap<String, String>, Vec<u8>) {
    let body = notification_body(TRANSACTION).into_bytes();
    let headers = signed_headers(&platform_signer(), PLATFORM_SERIAL, timestamp, NONCE, &body)
        .into_iter()
        .collect();
    (headers, body)
}

/// Replace the byte at `index` with a different one from `alphabet`.
fn replace_char(value: &str, index: Index, alphabet: &[u8]) -> String {
    let mut bytes = value.as_bytes().to_vec();
    let i = index.index(bytes.len());
    let next = alphabet
        .iter()
        .position(|c| *c == bytes[i])
        .map_or(0, |pos| (pos + 1) % alphabet.len());
    bytes[i] = alphabet[next];
    String::from_utf8(bytes).unwrap()
}

fn verify_blocking(headers: HashMap<String, String>, body: Vec<u8>) -> Result<Notification> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let (trust, _) = trust_manager();
        trust.verify_notification(&headers, &body).await
    })
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_valid_notification_is_verified_and_decrypted() {
    let (trust, source) = trust_manager();
    let (headers, body) = signed_notification(Utc::now().timestamp());

    let notification = trust.verify_notification(&headers, &body).await.unwrap();
    let content = notification.content_map().unwrap();

    assert_eq!(notification.event_type(), "TRANSACTION.SUCCESS");
    assert_eq!(content["transaction_id"], "4200000985202103031441826014");
    assert_eq!(content["amount"]["total"], 100);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_replay_window_boundary() {
    let (trust, _) = trust_manager();
    let signed_at = Utc::now();
    let (headers, body) = signed_notification(signed_at.timestamp());
    let context = || VerificationContext::from_headers(&headers, body.clone()).unwrap();

    for offset in [-299, 0, 299] {
        let now = signed_at + Duration::seconds(offset);
        assert!(
            trust.verifier().verify_at(context(), now).await.is_ok(),
            "offset {} should be inside the window",
            offset
        );
    }
    for offset in [-300, 300, 86_400] {
        let now = signed_at + Duration::seconds(offset);
        let err = trust.verifier().verify_at(context(), now).await.unwrap_err();
        assert_eq!(err.code(), WxPayErrorCode::StaleTimestamp, "offset {}", offset);
    }
}

#[tokio::test]
async fn test_rotated_certificate_verifies_after_refresh() {
    let (trust, source) = trust_manager();
    let now = Utc::now().timestamp();
    let body = notification_body(TRANSACTION).into_bytes();
    let next_headers: HashMap<String, String> = signed_headers(
        &platform_next_signer(),
        PLATFORM_NEXT_SERIAL,
        now,
        NONCE,
        &body,
    )
    .into_iter()
    .collect();

    let err = trust
        .verify_notification(&next_headers, &body)
        .await
        .unwrap_err();
    assert_eq!(err.code(), WxPayErrorCode::CertificateNotFound);

    source.set(Step::Records(vec![
        record(PLATFORM_CERT_PEM, PLATFORM_SERIAL, 30),
        record(PLATFORM_NEXT_CERT_PEM, PLATFORM_NEXT_SERIAL, 365),
    ]));
    trust.cache().refresh().await.unwrap();

    let (old_headers, _) = signed_notification(now);
    assert!(trust.verify_notification(&next_headers, &body).await.is_ok());
    assert!(trust.verify_notification(&old_headers, &body).await.is_ok());
}

#[tokio::test]
async fn test_stale_cache_served_then_exhausted() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let source = Arc::new(serving(vec![sealed_record(
        PLATFORM_CERT_PEM,
        PLATFORM_SERIAL,
        start - Duration::days(1),
        start + Duration::days(2),
    )]));
    let cache = PlatformCertificateCache::new(source.clone(), api_v3_key()).with_clock(clock.clone());
    let trust = PlatformTrustManager::new(credentials(), Arc::new(cache));
    trust.cache().refresh().await.unwrap();
    source.set(unreachable());

    // Past the refresh point but before the certificate expires.
    let late = start + Duration::days(2) - Duration::seconds(30);
    clock.set(late);
    let (headers, body) = signed_notification(late.timestamp());
    assert!(trust.verify_notification(&headers, &body).await.is_ok());
    assert_eq!(source.calls(), 2);

    let expired = start + Duration::days(3);
    clock.set(expired);
    let (headers, body) = signed_notification(expired.timestamp());
    let err = trust.verify_notification(&headers, &body).await.unwrap_err();
    assert_eq!(err.code(), WxPayErrorCode::CacheExhausted);
}

#[tokio::test]
async fn test_missing_headers_are_rejected_before_download() {
    let (trust, source) = trust_manager();
    let (mut headers, body) = signed_notification(Utc::now().timestamp());
    headers.remove("Wechatpay-Signature");

    let err = trust.verify_notification(&headers, &body).await.unwrap_err();

    assert_eq!(err.code(), WxPayErrorCode::MissingHeader);
    assert_eq!(source.calls(), 0);
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_body_bit_flip_is_rejected(index in any::<Index>(), bit in 0u8..8) {
        let (headers, mut body) = signed_notification(Utc::now().timestamp());
        let i = index.index(body.len());
        body[i] ^= 1 << bit;

        let err = verify_blocking(headers, body).unwrap_err();
        prop_assert!(err.is_verification_failure(), "unexpected error: {}", err);
    }

    #[test]
    fn prop_signature_change_is_rejected(index in any::<Index>()) {
        let (mut headers, body) = signed_notification(Utc::now().timestamp());
        let signature = headers["Wechatpay-Signature"].clone();
        headers.insert(
            "Wechatpay-Signature".to_string(),
            replace_char(&signature, index, BASE64_ALPHABET),
        );

        let err = verify_blocking(headers, body).unwrap_err();
        prop_assert!(err.is_verification_failure(), "unexpected error: {}", err);
    }

    #[test]
    fn prop_nonce_change_is_rejected(index in any::<Index>()) {
        let (mut headers, body) = signed_notification(Utc::now().timestamp());
        headers.insert(
            "Wechatpay-Nonce".to_string(),
            replace_char(NONCE, index, ALPHANUMERIC),
        );

        let err = verify_blocking(headers, body).unwrap_err();
        prop_assert_eq!(err.code(), WxPayErrorCode::SignatureMismatch);
    }

    #[test]
    fn prop_timestamp_change_is_rejected(index in any::<Index>()) {
        let (mut headers, body) = signed_notification(Utc::now().timestamp());
        let timestamp = headers["Wechatpay-Timestamp"].clone();
        headers.insert(
            "Wechatpay-Timestamp".to_string(),
            replace_char(&timestamp, index, DIGITS),
        );

        let err = verify_blocking(headers, body).unwrap_err();
        prop_assert!(
            matches!(
                err.code(),
                WxPayErrorCode::SignatureMismatch | WxPayErrorCode::StaleTimestamp
            ),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn prop_any_signed_message_verifies(
        body in proptest::collection::vec(any::<u8>(), 0..512),
        nonce in "[0-9A-Za-z]{1,32}",
        skew in -290i64..=290,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let timestamp = Utc::now().timestamp() + skew;
        let headers: HashMap<String, String> =
            signed_headers(&platform_signer(), PLATFORM_SERIAL, timestamp, &nonce, &body)
                .into_iter()
                .collect();

        let verified = runtime.block_on(async {
            let (trust, _) = trust_manager();
            let context = VerificationContext::from_headers(&headers, body.clone())?;
            trust.verify(context).await
        });

        let verified = verified.unwrap();
        prop_assert_eq!(verified.body(), body.as_slice());
        prop_assert_eq!(verified.nonce(), nonce.as_str());
    }
}
