//! The rate-limit interceptor: identity → consume → admit/reject → annotate.
//!
//! Per request the flow is
//! `Received → (Skipped | Evaluated) → (Admitted | Rejected) → Annotated → Done`.
//! Skipped requests go straight to the downstream service and come back
//! untouched. Evaluated requests always carry the three quota headers, whether
//! the downstream ran or a 429 was synthesized.

use crate::config::{InterceptorConfig, LimitPeriod, LivePeriod};
use crate::error::{BuildError, InterceptError};
use crate::headers;
use crate::identity::{Identity, IdentityFn};
use crate::quota::{QuotaAuthority, QuotaDecision};
use crate::response::{DefaultResponseFactory, ResponseFactory, TOO_MANY_REQUESTS_REASON};
use crate::telemetry::{try_emit, NullSink, QuotaEvent, TelemetrySink};
use http::{Request, Response, StatusCode};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tower::ServiceExt;
use tower_service::Service;

/// Gates each request on a [`QuotaAuthority`] and annotates the response.
///
/// Holds no per-request state; the only mutable field is the limit period,
/// which can be changed through a shared reference. Share it behind an `Arc`
/// (as [`RateLimitLayer`](crate::RateLimitLayer) does) and call it from any number of tasks.
pub struct RateLimitInterceptor<A, I, F = DefaultResponseFactory, T = NullSink> {
    authority: A,
    identity: I,
    responses: F,
    sink: T,
    period: LivePeriod,
    dropped_events: AtomicU64,
}

impl<A, I> RateLimitInterceptor<A, I> {
    /// Start building an interceptor. The authority and identity strategy are required.
    pub fn builder(authority: A, identity: I) -> RateLimitInterceptorBuilder<A, I> {
        RateLimitInterceptorBuilder::new(authority, identity)
    }

    /// Interceptor with the default response factory, no telemetry and a one-hour period.
    pub fn new(authority: A, identity: I) -> Self {
        Self {
            authority,
            identity,
            responses: DefaultResponseFactory,
            sink: NullSink,
            period: LivePeriod::new(LimitPeriod::default()),
            dropped_events: AtomicU64::new(0),
        }
    }
}

impl<A, I, F, T> RateLimitInterceptor<A, I, F, T> {
    /// Period used by the next processed request.
    pub fn limit_period(&self) -> LimitPeriod {
        self.period.get()
    }

    /// Change the period passed to `consume` and `limit` from the next request on.
    pub fn set_limit_period(&self, period: LimitPeriod) {
        tracing::debug!(period = %period, "limit period updated");
        self.period.set(period);
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub fn response_factory(&self) -> &F {
        &self.responses
    }

    pub fn identity_fn(&self) -> &I {
        &self.identity
    }

    /// Telemetry events the sink was not ready to take.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl<A, I, F, T> RateLimitInterceptor<A, I, F, T>
where
    A: QuotaAuthority,
    T: TelemetrySink,
{
    /// Run one request through the interceptor.
    ///
    /// `downstream` is driven with `oneshot`, so it is polled ready first. It is
    /// called exactly once when the request is skipped or admitted and never when
    /// it is rejected. Identity and authority failures are returned as errors;
    /// no default decision is substituted.
    pub async fn process<ReqB, ResB, S>(
        &self,
        request: Request<ReqB>,
        downstream: S,
    ) -> Result<Response<ResB>, InterceptError<S::Error>>
    where
        I: IdentityFn<ReqB>,
        F: ResponseFactory<ResB>,
        S: Service<Request<ReqB>, Response = Response<ResB>>,
    {
        let identity = match self.identity.identify(&request) {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::debug!("rate limiting skipped");
                self.emit(QuotaEvent::Skipped);
                return downstream.oneshot(request).await.map_err(InterceptError::Inner);
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity derivation failed");
                return Err(InterceptError::Identity(e));
            }
        };

        let decision = self.evaluate(&identity).await.map_err(InterceptError::Authority)?;

        let response = if decision.admitted {
            tracing::debug!(
                identity = %identity,
                limit = decision.limit,
                remaining = decision.remaining,
                "request admitted"
            );
            self.emit(QuotaEvent::Admitted { identity, decision });
            downstream.oneshot(request).await.map_err(InterceptError::Inner)?
        } else {
            tracing::info!(
                identity = %identity,
                limit = decision.limit,
                remaining = decision.remaining,
                reset = decision.reset_at,
                "request rejected"
            );
            self.emit(QuotaEvent::Rejected { identity, decision });
            self.responses
                .create_response(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_REASON)
        };

        Ok(headers::annotate(response, &decision))
    }

    /// Consume one unit and look up the nominal limit, concurrently.
    async fn evaluate(&self, identity: &Identity) -> Result<QuotaDecision, crate::BoxError> {
        let period = self.period.get();
        let outcome = futures::future::try_join(
            self.authority.consume(identity, period),
            self.authority.limit(period),
        )
        .await;

        match outcome {
            Ok((consumption, limit)) => Ok(QuotaDecision::new(limit, consumption)),
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    period = %period,
                    error = %e,
                    "quota authority failed"
                );
                let error = e.to_string();
                self.emit(QuotaEvent::AuthorityFailed { identity: identity.clone(), error });
                Err(e)
            }
        }
    }

    /// Offer an event to the sink without waiting on it.
    fn emit(&self, event: QuotaEvent) {
        let mut sink = self.sink.clone();
        if !try_emit(&mut sink, event) {
            let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(dropped, "telemetry sink busy, event dropped");
        }
    }
}

impl<A, I, F, T> fmt::Debug for RateLimitInterceptor<A, I, F, T>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitInterceptor")
            .field("authority", &self.authority)
            .field("limit_period", &self.period.get())
            .field("dropped_events", &self.dropped_events())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RateLimitInterceptor`].
pub struct RateLimitInterceptorBuilder<A, I, F = DefaultResponseFactory, T = NullSink> {
    authority: A,
    identity: I,
    responses: F,
    sink: T,
    limit_period_secs: u64,
}

impl<A, I> RateLimitInterceptorBuilder<A, I> {
    /// Create a builder with the default response factory, no telemetry and a one-hour period.
    pub fn new(authority: A, identity: I) -> Self {
        Self {
            authority,
            identity,
            responses: DefaultResponseFactory,
            sink: NullSink,
            limit_period_secs: LimitPeriod::default().as_secs(),
        }
    }
}

impl<A, I, F, T> RateLimitInterceptorBuilder<A, I, F, T> {
    /// Factory used to synthesize the 429 response.
    pub fn response_factory<F2>(self, responses: F2) -> RateLimitInterceptorBuilder<A, I, F2, T> {
        RateLimitInterceptorBuilder {
            authority: self.authority,
            identity: self.identity,
            responses,
            sink: self.sink,
            limit_period_secs: self.limit_period_secs,
        }
    }

    /// Sink receiving one [`QuotaEvent`] per processed request.
    pub fn telemetry<T2>(self, sink: T2) -> RateLimitInterceptorBuilder<A, I, F, T2>
    where
        T2: TelemetrySink,
    {
        RateLimitInterceptorBuilder {
            authority: self.authority,
            identity: self.identity,
            responses: self.responses,
            sink,
            limit_period_secs: self.limit_period_secs,
        }
    }

    /// Reporting period in seconds. Must be > 0.
    pub fn limit_period_secs(mut self, secs: u64) -> Self {
        self.limit_period_secs = secs;
        self
    }

    /// Apply settings loaded from configuration.
    pub fn config(mut self, config: &InterceptorConfig) -> Self {
        self.limit_period_secs = config.limit_period_secs;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RateLimitInterceptor<A, I, F, T>, BuildError> {
        let period = LimitPeriod::new(self.limit_period_secs)?;
        Ok(RateLimitInterceptor {
            authority: self.authority,
            identity: self.identity,
            responses: self.responses,
            sink: self.sink,
            period: LivePeriod::new(period),
            dropped_events: AtomicU64::new(0),
        })
    }
}
