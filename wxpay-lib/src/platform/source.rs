//! Where platform certificates come from.

use async_trait::async_trait;
use reqwest::Method;

use super::download::{CertificateList, CertificateRecord, CERTIFICATES_PATH};
use crate::transport::{SignedResponse, SignedTransport};
use crate::Result;

/// Result of one certificate download.
#[derive(Clone, Debug, Default)]
pub struct CertificateDownload {
    /// Sealed certificate records.
    pub records: Vec<CertificateRecord>,
    /// The signed HTTP response the records came from, when there is one.
    ///
    /// When present, the cache checks its platform signature against the
    /// freshly decrypted certificates before accepting them.
    pub response: Option<SignedResponse>,
}

impl CertificateDownload {
    /// A download with no response signature to check.
    pub fn unsigned(records: Vec<CertificateRecord>) -> Self {
        Self {
            records,
            response: None,
        }
    }
}

/// Fetches sealed platform certificate records.
///
/// Implementations must be safe to call from several tasks, although the
/// cache never runs two downloads at once.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Download the current certificate records.
    async fn download(&self) -> Result<CertificateDownload>;
}

/// Downloads certificates from `GET /v3/certificates`.
///
/// The request is signed with the merchant key only, so no platform
/// certificate is needed to obtain the first one.
#[derive(Clone, Debug)]
pub struct HttpCertificateSource {
    transport: SignedTransport,
}

impl HttpCertificateSource {
    /// Create a source over a signed transport.
    pub fn new(transport: SignedTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl CertificateSource for HttpCertificateSource {
    async fn download(&self) -> Result<CertificateDownload> {
        let response = self
            .transport
            .send(Method::GET, CERTIFICATES_PATH, None, &[])
            .await?;
        let list: CertificateList = response.json()?;
        tracing::debug!(
            records = list.data.len(),
            request_id = response.request_id(),
            "downloaded platform certificates"
        );

        Ok(CertificateDownload {
            records: list.data,
            response: Some(response),
        })
    }
}
