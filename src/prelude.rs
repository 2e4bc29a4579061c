//! Convenient re-exports for common quotagate types.
pub use crate::{
    config::{InterceptorConfig, LimitPeriod},
    error::{BoxError, BuildError, InterceptError},
    headers::{X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET},
    identity::{self, Identity, IdentityFn},
    interceptor::RateLimitInterceptor,
    middleware::{RateLimitLayer, RateLimitService},
    quota::{Consumption, QuotaAuthority, QuotaDecision},
    response::{DefaultResponseFactory, PlainTextResponseFactory, ResponseFactory},
    telemetry::{LogSink, MemorySink, NonBlockingSink, NullSink, QuotaEvent, TelemetrySink},
};
