//! Quota authority contract.
//!
//! The interceptor never counts requests itself. It asks a [`QuotaAuthority`]
//! to consume one unit from a bucket and to report the nominal limit for the
//! configured period:
//! - **Middleware**: [`RateLimitInterceptor`](crate::RateLimitInterceptor) derives the bucket
//!   identity and renders the answer as headers. It doesn't know *how* quotas work.
//! - **Authority**: any backend (in-memory, shared cache, remote service) that
//!   makes `consume` atomic per identity under concurrent callers.

use crate::config::LimitPeriod;
use crate::error::BoxError;
use crate::identity::Identity;
use async_trait::async_trait;
use std::sync::Arc;

pub mod recording;
pub use recording::RecordingAuthority;

/// Outcome of one `consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    /// Whether the unit was taken.
    pub admitted: bool,
    /// Units left in the bucket after this attempt.
    pub remaining: u64,
    /// Epoch seconds at which the bucket is expected to have capacity again.
    pub reset_at: u64,
}

impl Consumption {
    pub fn admitted(remaining: u64, reset_at: u64) -> Self {
        Self { admitted: true, remaining, reset_at }
    }

    pub fn rejected(remaining: u64, reset_at: u64) -> Self {
        Self { admitted: false, remaining, reset_at }
    }
}

/// Everything rendered for one evaluated request.
///
/// `limit` and `remaining` come from independent calls; no consistency
/// between them is assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub admitted: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
}

impl QuotaDecision {
    pub fn new(limit: u64, consumption: Consumption) -> Self {
        Self {
            admitted: consumption.admitted,
            limit,
            remaining: consumption.remaining,
            reset_at: consumption.reset_at,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }
}

/// Source of truth for per-identity quotas.
///
/// `consume` must be atomic per identity: two concurrent callers sharing an
/// identity must observe one shared bucket.
#[async_trait]
pub trait QuotaAuthority: Send + Sync {
    /// Try to take one unit from `identity`'s bucket.
    async fn consume(&self, identity: &Identity, period: LimitPeriod)
        -> Result<Consumption, BoxError>;

    /// Nominal number of requests allowed per `period`.
    async fn limit(&self, period: LimitPeriod) -> Result<u64, BoxError>;
}

#[async_trait]
impl<A> QuotaAuthority for Arc<A>
where
    A: QuotaAuthority + ?Sized,
{
    async fn consume(
        &self,
        identity: &Identity,
        period: LimitPeriod,
    ) -> Result<Consumption, BoxError> {
        (**self).consume(identity, period).await
    }

    async fn limit(&self, period: LimitPeriod) -> Result<u64, BoxError> {
        (**self).limit(period).await
    }
}
