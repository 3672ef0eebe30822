//! Test utilities for the trust layer.
//!
//! - Fixture keys and certificates (RSA-2048, fixed serials)
//! - A manual clock for freshness boundaries
//! - A scripted certificate source that counts downloads
//! - Helpers that sign inbound messages with the fixture platform key
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wxpay_lib::test_utils::{FakeCertificateSource, ManualClock, Step, sealed_record};
//!
//! let source = Arc::new(FakeCertificateSource::new(vec![
//!     Step::Records(vec![sealed_record(PLATFORM_CERT_PEM, PLATFORM_SERIAL, from, until)]),
//!     Step::Fail("connection reset".into()),
//! ]));
//! let cache = PlatformCertificateCache::new(source.clone(), api_v3_key())
//!     .with_clock(Arc::new(ManualClock::new(start)));
//! ```

mod fixtures;
mod mock_platform;

pub use fixtures::{
    api_v3_key, credentials, merchant_private_key, merchant_public_key, notification_body,
    platform_next_signer, platform_private_key, platform_signer, sealed_record, signed_headers,
    API_V3_KEY, MERCHANT_CERT_PEM, MERCHANT_KEY_PEM, MERCHANT_SERIAL, PLATFORM_CERT_PEM,
    PLATFORM_KEY_PEM, PLATFORM_NEXT_CERT_PEM, PLATFORM_NEXT_KEY_PEM, PLATFORM_NEXT_SERIAL,
    PLATFORM_SERIAL, TEST_REQUEST_ID,
};

pub use mock_platform::{verified_message, FakeCertificateSource, ManualClock, Step};
