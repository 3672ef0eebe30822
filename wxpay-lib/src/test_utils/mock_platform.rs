//! Scripted platform collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::fixtures::{
    api_v3_key, platform_signer, sealed_record, signed_headers, PLATFORM_CERT_PEM,
    PLATFORM_SERIAL,
};
use crate::clock::Clock;
use crate::platform::{
    CertificateDownload, CertificateRecord, CertificateSource, PlatformCertificateCache,
};
use crate::verifier::{VerifiedMessage, Verifier};
use crate::{Result, WxPayError};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock stopped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    /// Move forward (or backward) by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

/// One scripted download outcome.
#[derive(Clone, Debug)]
pub enum Step {
    /// Return these records with no response signature.
    Records(Vec<CertificateRecord>),
    /// Return a full download, including a signed response.
    Download(CertificateDownload),
    /// Fail with a transport error carrying this message.
    Fail(String),
}

/// A [`CertificateSource`] that replays a script and counts calls.
///
/// Steps are consumed in order; the last one repeats forever.
#[derive(Debug)]
pub struct FakeCertificateSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl FakeCertificateSource {
    /// Create a source from a script. An empty script fails every call.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every download.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append a step to the script.
    pub fn push(&self, step: Step) {
        self.steps.lock().expect("script lock poisoned").push_back(step);
    }

    /// Drop the rest of the script and repeat `step` from now on.
    pub fn set(&self, step: Step) {
        let mut steps = self.steps.lock().expect("script lock poisoned");
        steps.clear();
        steps.push_back(step);
    }

    /// Number of downloads attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step> {
        let mut steps = self.steps.lock().expect("script lock poisoned");
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

#[async_trait]
impl CertificateSource for FakeCertificateSource {
    async fn download(&self) -> Result<CertificateDownload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step() {
            Some(Step::Records(records)) => Ok(CertificateDownload::unsigned(records)),
            Some(Step::Download(download)) => Ok(download),
            Some(Step::Fail(reason)) => Err(WxPayError::Transport(reason)),
            None => Err(WxPayError::Transport("no scripted download".to_string())),
        }
    }
}

/// Sign `body` with the fixture platform key and run it through a real verifier.
pub async fn verified_message(body: &[u8]) -> VerifiedMessage {
    let now = Utc::now();
    let source = Arc::new(FakeCertificateSource::new(vec![Step::Records(vec![
        sealed_record(
            PLATFORM_CERT_PEM,
            PLATFORM_SERIAL,
            now - Duration::days(1),
            now + Duration::days(30),
        ),
    ])]));
    let cache = Arc::new(PlatformCertificateCache::new(source, api_v3_key()));
    let headers = signed_headers(
        &platform_signer(),
        PLATFORM_SERIAL,
        now.timestamp(),
        "fixture-nonce",
        body,
    );

    Verifier::new(cache)
        .verify(&headers, body)
        .await
        .expect("fixture message verifies")
}
