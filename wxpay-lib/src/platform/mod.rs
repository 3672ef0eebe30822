//! Platform certificates: download, decryption, caching and refresh.
//!
//! - [`certificate`]: the certificate model and X.509 parsing
//! - [`download`]: `/v3/certificates` wire types and sealed envelopes
//! - [`source`]: where certificate records come from
//! - [`cache`]: the expiring cache with lazy and background refresh

pub mod cache;
pub mod certificate;
pub mod download;
pub mod source;

pub use cache::{
    CacheEntry, CertificateSet, PlatformCertificateCache, RefreshHandle,
    DEFAULT_EXPIRY_MARGIN_SECS, DEFAULT_MAX_CLOCK_SKEW_SECS,
};
pub use certificate::{parse_certificate_pem, serial_hex, ParsedCertificate, PlatformCertificate};
pub use download::{CertificateList, CertificateRecord, EncryptedResource, CERTIFICATES_PATH};
pub use source::{CertificateDownload, CertificateSource, HttpCertificateSource};
