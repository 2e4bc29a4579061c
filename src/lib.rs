#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # quotagate
//!
//! Per-identity request quotas for tower HTTP services.
//!
//! The interceptor derives a bucket identity from each request, asks a
//! [`QuotaAuthority`] to consume one unit from that bucket, and either forwards
//! the request or answers `429 Too Many Requests`. Either way the response
//! carries `X-Rate-Limit-Limit`, `X-Rate-Limit-Remaining` and
//! `X-Rate-Limit-Reset`. Requests without an identity bypass the interceptor
//! entirely and get no headers.
//!
//! ## Features
//!
//! - **Pluggable identity**: closures, a request header, or one global bucket
//! - **Authority trait**: bring any backend that consumes atomically per identity
//! - **Tower middleware**: [`RateLimitLayer`] drops into a `ServiceBuilder` stack
//! - **Live period**: change the reported period without rebuilding the stack
//! - **Telemetry**: one [`QuotaEvent`](telemetry::QuotaEvent) per request, to any sink
//!
//! ## Quick Start
//!
//! Implement [`QuotaAuthority`] over whatever store holds your counters. The
//! authority below only answers "admitted" and is there to show the wiring.
//!
//! ```rust
//! use async_trait::async_trait;
//! use quotagate::{identity, BoxError, Consumption, Identity, LimitPeriod, QuotaAuthority};
//! use quotagate::{RateLimitInterceptor, RateLimitLayer};
//! use http::{HeaderName, Request, Response};
//! use std::convert::Infallible;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! struct AlwaysAdmit {
//!     limit: u64,
//! }
//!
//! #[async_trait]
//! impl QuotaAuthority for AlwaysAdmit {
//!     async fn consume(&self, _id: &Identity, _p: LimitPeriod) -> Result<Consumption, BoxError> {
//!         Ok(Consumption::admitted(self.limit - 1, 0))
//!     }
//!
//!     async fn limit(&self, _period: LimitPeriod) -> Result<u64, BoxError> {
//!         Ok(self.limit)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let interceptor = RateLimitInterceptor::builder(
//!         AlwaysAdmit { limit: 100 },
//!         identity::from_header(HeaderName::from_static("x-api-key")),
//!     )
//!     .limit_period_secs(60)
//!     .build()
//!     .unwrap();
//!
//!     let svc = ServiceBuilder::new()
//!         .layer(RateLimitLayer::new(interceptor))
//!         .service_fn(|_req: Request<()>| async {
//!             Ok::<_, Infallible>(Response::new(String::from("hello")))
//!         });
//!
//!     let req = Request::builder().header("x-api-key", "k1").body(()).unwrap();
//!     let res = svc.oneshot(req).await.unwrap();
//!     assert_eq!(res.headers()["x-rate-limit-limit"], "100");
//!     assert_eq!(res.headers()["x-rate-limit-remaining"], "99");
//! }
//! ```

pub mod config;
pub mod error;
pub mod headers;
pub mod identity;
pub mod interceptor;
pub mod middleware;
pub mod prelude;
pub mod quota;
pub mod response;
pub mod telemetry;

// Re-exports
pub use config::{InterceptorConfig, LimitPeriod, DEFAULT_LIMIT_PERIOD_SECS};
pub use error::{BoxError, BuildError, InterceptError};
pub use identity::{Identity, IdentityFn};
pub use interceptor::{RateLimitInterceptor, RateLimitInterceptorBuilder};
pub use middleware::{RateLimitLayer, RateLimitService};
pub use quota::{Consumption, QuotaAuthority, QuotaDecision};
pub use response::{DefaultResponseFactory, PlainTextResponseFactory, ResponseFactory};
