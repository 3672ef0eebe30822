//! Platform certificate cache.
//!
//! The cache owns one immutable [`CacheEntry`] behind an `Arc`. Readers clone
//! the `Arc` and never see it change; a refresh builds a new entry and swaps
//! the pointer. Refreshes are serialized by an async mutex and double-checked
//! after the lock is taken, so concurrent callers that find the cache stale
//! share a single download. Every finished attempt bumps a generation
//! counter and records its failure, if any; a caller that waited on the lock
//! while an attempt ran takes that attempt's outcome instead of downloading
//! again.
//!
//! Two refresh paths exist:
//!
//! - **Lazy**: [`PlatformCertificateCache::entry`] refreshes when
//!   `now >= expires_at`. If that refresh fails, a stale entry whose
//!   certificates have not yet reached `not_after` keeps being served; once
//!   they have, callers get [`WxPayError::CacheExhausted`].
//! - **Background**: [`PlatformCertificateCache::spawn_refresher`] forces a
//!   refresh on a fixed interval and only logs failures.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::certificate::PlatformCertificate;
use super::source::CertificateSource;
use crate::clock::{Clock, SystemClock};
use crate::crypto::ApiV3Key;
use crate::verifier::{check_freshness, check_signature, VerificationContext, Verifier};
use crate::{Result, WxPayError};

/// Default safety margin subtracted from `not_after`.
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 60;

/// Default anti-replay window, in seconds.
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Platform certificates keyed by serial number.
pub type CertificateSet = HashMap<String, Arc<PlatformCertificate>>;

/// An immutable snapshot of the cached certificates.
#[derive(Debug)]
pub struct CacheEntry {
    certificates: CertificateSet,
    expires_at: DateTime<Utc>,
    fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry from a freshly downloaded set.
    ///
    /// `expires_at` is the earliest `not_after` of `downloaded` minus
    /// `margin`. Certificates in `retained` are kept for verification but do
    /// not influence `expires_at`.
    pub fn new(
        downloaded: Vec<PlatformCertificate>,
        retained: Vec<Arc<PlatformCertificate>>,
        margin: ChronoDuration,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self> {
        let earliest = downloaded
            .iter()
            .map(PlatformCertificate::not_after)
            .min()
            .ok_or_else(|| WxPayError::invalid_data("certificates", "download contained no certificates"))?;

        let mut certificates: CertificateSet = retained
            .into_iter()
            .map(|cert| (cert.serial_number().to_string(), cert))
            .collect();
        for cert in downloaded {
            certificates.insert(cert.serial_number().to_string(), Arc::new(cert));
        }

        Ok(Self {
            certificates,
            expires_at: earliest
                .checked_sub_signed(margin)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            fetched_at,
        })
    }

    /// When the entry must be refreshed.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// When the entry was built.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// True while `now < expires_at`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True while at least one certificate has not reached `not_after`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.certificates.values().any(|c| c.is_unexpired_at(now))
    }

    /// All certificates, including retained ones.
    pub fn certificates(&self) -> &CertificateSet {
        &self.certificates
    }

    /// Look up a certificate by serial, ignoring case.
    pub fn get(&self, serial: &str) -> Option<&Arc<PlatformCertificate>> {
        self.certificates.get(serial).or_else(|| {
            self.certificates
                .iter()
                .find(|(s, _)| s.eq_ignore_ascii_case(serial))
                .map(|(_, cert)| cert)
        })
    }

    /// Sorted serial numbers.
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.certificates.keys().cloned().collect();
        serials.sort();
        serials
    }

    /// The certificate new data should be encrypted under.
    ///
    /// The newest certificate already in effect, falling back to the newest
    /// unexpired one.
    pub fn current_certificate(&self, now: DateTime<Utc>) -> Option<Arc<PlatformCertificate>> {
        let newest = |effective_only: bool| {
            self.certificates
                .values()
                .filter(|c| c.is_unexpired_at(now))
                .filter(|c| !effective_only || c.is_effective_at(now))
                .max_by_key(|c| (c.not_before(), c.not_after()))
                .cloned()
        };
        newest(true).or_else(|| newest(false))
    }
}

/// Caches the platform's certificates and keeps them fresh.
pub struct PlatformCertificateCache {
    source: Arc<dyn CertificateSource>,
    api_v3_key: ApiV3Key,
    clock: Arc<dyn Clock>,
    expiry_margin: ChronoDuration,
    max_clock_skew_secs: u64,
    current: RwLock<Option<Arc<CacheEntry>>>,
    refresh_lock: Mutex<()>,
    attempts: AtomicU64,
    last_failure: RwLock<Option<WxPayError>>,
}

/// Seconds as a chrono duration, saturating instead of wrapping.
fn margin_from_secs(secs: u64) -> ChronoDuration {
    i64::try_from(secs)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .unwrap_or(ChronoDuration::MAX)
}

impl PlatformCertificateCache {
    /// Create an empty cache. Nothing is downloaded until first use.
    pub fn new(source: Arc<dyn CertificateSource>, api_v3_key: ApiV3Key) -> Self {
        Self {
            source,
            api_v3_key,
            clock: Arc::new(SystemClock),
            expiry_margin: margin_from_secs(DEFAULT_EXPIRY_MARGIN_SECS),
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_failure: RwLock::new(None),
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the safety margin subtracted from certificate expiry.
    ///
    /// Margins beyond what a timestamp can represent saturate, which makes
    /// every entry stale as soon as it is built.
    pub fn with_expiry_margin(mut self, secs: u64) -> Self {
        self.expiry_margin = margin_from_secs(secs);
        self
    }

    /// Set the anti-replay window used by verifiers built from this cache.
    pub fn with_max_clock_skew(mut self, secs: u64) -> Self {
        self.max_clock_skew_secs = secs;
        self
    }

    /// The cache's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Anti-replay window in seconds.
    pub fn max_clock_skew_secs(&self) -> u64 {
        self.max_clock_skew_secs
    }

    /// The current entry without refreshing, if any.
    pub fn snapshot(&self) -> Option<Arc<CacheEntry>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, entry: Arc<CacheEntry>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    /// Return a fresh entry, refreshing first if needed.
    ///
    /// Callers that queue behind an in-flight refresh share its outcome:
    /// one download per attempt, whether it succeeds or fails.
    pub async fn entry(&self) -> Result<Arc<CacheEntry>> {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(entry) = self.snapshot() {
            if entry.is_fresh_at(self.clock.now()) {
                return Ok(entry);
            }
        }

        let _guard = self.refresh_lock.lock().await;

        let now = self.clock.now();
        let stale = match self.snapshot() {
            Some(entry) if entry.is_fresh_at(now) => return Ok(entry),
            other => other,
        };

        let outcome = if self.attempts.load(Ordering::Acquire) == seen {
            self.fetch(now).await
        } else {
            self.shared_outcome(stale.clone())
        };

        match outcome {
            Ok(entry) => Ok(entry),
            Err(err) => match stale {
                Some(entry) if entry.is_usable_at(now) => {
                    tracing::warn!(
                        error = %err,
                        expires_at = %entry.expires_at(),
                        "platform certificate refresh failed, serving cached certificates"
                    );
                    Ok(entry)
                }
                Some(entry) => {
                    tracing::error!(
                        error = %err,
                        expired_at = %entry.expires_at(),
                        "platform certificates expired and refresh failed"
                    );
                    Err(WxPayError::CacheExhausted {
                        reason: err.to_string(),
                    })
                }
                None => Err(err),
            },
        }
    }

    /// The outcome of the attempt that finished while this caller waited.
    fn shared_outcome(&self, current: Option<Arc<CacheEntry>>) -> Result<Arc<CacheEntry>> {
        let failure = self
            .last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match (failure, current) {
            (Some(err), _) => Err(err),
            (None, Some(entry)) => Ok(entry),
            (None, None) => Err(WxPayError::Internal(
                "certificate refresh succeeded without storing an entry".to_string(),
            )),
        }
    }

    /// The certificate to encrypt new data under.
    pub async fn current_certificate(&self) -> Result<Arc<PlatformCertificate>> {
        let entry = self.entry().await?;
        entry
            .current_certificate(self.clock.now())
            .ok_or_else(|| WxPayError::CacheExhausted {
                reason: "no unexpired platform certificate".to_string(),
            })
    }

    /// A verifier backed by this cache, after making sure it is populated.
    pub async fn verifier(self: &Arc<Self>) -> Result<Verifier> {
        self.entry().await?;
        Ok(Verifier::new(Arc::clone(self)))
    }

    /// Download unconditionally and replace the entry.
    ///
    /// On failure the current entry is left untouched.
    pub async fn refresh(&self) -> Result<Arc<CacheEntry>> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch(self.clock.now()).await
    }

    /// Run one refresh attempt and publish its outcome. Caller holds the refresh lock.
    async fn fetch(&self, now: DateTime<Utc>) -> Result<Arc<CacheEntry>> {
        let outcome = self.download_entry(now).await;
        *self
            .last_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = outcome.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Download, decrypt, validate and swap in a new entry.
    #[tracing::instrument(skip(self))]
    async fn download_entry(&self, now: DateTime<Utc>) -> Result<Arc<CacheEntry>> {
        tracing::info!("refreshing platform certificates");

        let download = self.source.download().await?;
        let mut downloaded = Vec::with_capacity(download.records.len());
        for record in &download.records {
            let cert = record.open(&self.api_v3_key)?;
            if cert.is_unexpired_at(now) {
                downloaded.push(cert);
            } else {
                tracing::debug!(serial = %cert.serial_number(), "skipping expired platform certificate");
            }
        }

        let retained: Vec<Arc<PlatformCertificate>> = self
            .snapshot()
            .map(|old| {
                old.certificates()
                    .values()
                    .filter(|c| c.is_unexpired_at(now))
                    .filter(|c| !downloaded.iter().any(|d| d.serial_number() == c.serial_number()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let entry = CacheEntry::new(downloaded, retained, self.expiry_margin, now)?;

        if let Some(response) = &download.response {
            let context = VerificationContext::from_headers(&response.headers, response.body.clone())?;
            check_freshness(&context, now, self.max_clock_skew_secs)?;
            check_signature(&entry, &context, now)?;
        }

        let entry = Arc::new(entry);
        self.store(Arc::clone(&entry));
        tracing::info!(
            serials = ?entry.serials(),
            expires_at = %entry.expires_at(),
            "platform certificates refreshed"
        );
        Ok(entry)
    }

    /// Refresh on a fixed interval in the background.
    ///
    /// The first refresh happens one `interval` from now. Failures are
    /// logged and retried on the next tick. The task stops when the handle
    /// is dropped or the cache is.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> RefreshHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(err) = cache.refresh().await {
                    tracing::warn!(
                        error = %err,
                        retry_in_secs = interval.as_secs(),
                        "background platform certificate refresh failed"
                    );
                }
            }
        });

        RefreshHandle { task }
    }
}

impl std::fmt::Debug for PlatformCertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCertificateCache")
            .field("expiry_margin", &self.expiry_margin)
            .field("max_clock_skew_secs", &self.max_clock_skew_secs)
            .field("current", &self.snapshot())
            .finish()
    }
}

/// Owns the background refresh task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop refreshing.
    pub fn stop(self) {
        self.task.abort();
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
