//! Time source used for freshness checks.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// The certificate cache and the verifier read time through this trait so
/// expiry and replay-window boundaries can be exercised deterministically.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
