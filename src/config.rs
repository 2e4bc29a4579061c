//! Interceptor configuration: the reporting period and its serializable form.

use crate::error::BuildError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default reporting period: one hour.
pub const DEFAULT_LIMIT_PERIOD_SECS: u64 = 3600;

/// Window (in whole seconds) the authority is asked to report its nominal limit for.
///
/// The period is also forwarded to `consume`, but capacity and refill stay
/// entirely with the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LimitPeriod(u64);

impl LimitPeriod {
    /// Create a period. Rejects zero.
    pub fn new(secs: u64) -> Result<Self, BuildError> {
        if secs == 0 {
            return Err(BuildError::InvalidLimitPeriod(secs));
        }
        Ok(Self(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for LimitPeriod {
    fn default() -> Self {
        Self(DEFAULT_LIMIT_PERIOD_SECS)
    }
}

impl fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl TryFrom<u64> for LimitPeriod {
    type Error = BuildError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::new(secs)
    }
}

/// Live period shared by every request going through one interceptor.
///
/// Updates are visible to the next request; decisions already rendered keep
/// the period they were evaluated with.
#[derive(Debug)]
pub(crate) struct LivePeriod(AtomicU64);

impl LivePeriod {
    pub(crate) fn new(period: LimitPeriod) -> Self {
        Self(AtomicU64::new(period.as_secs()))
    }

    pub(crate) fn get(&self) -> LimitPeriod {
        LimitPeriod(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, period: LimitPeriod) {
        self.0.store(period.as_secs(), Ordering::Release);
    }
}

/// Serializable interceptor settings, for hosts that load middleware config from files.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InterceptorConfig {
    /// Reporting period in seconds (must be > 0)
    pub limit_period_secs: u64,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self { limit_period_secs: DEFAULT_LIMIT_PERIOD_SECS }
    }
}

impl InterceptorConfig {
    /// Validate and convert the configured period.
    pub fn limit_period(&self) -> Result<LimitPeriod, BuildError> {
        LimitPeriod::new(self.limit_period_secs)
    }
}
