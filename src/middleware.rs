//! Tower middleware around a shared [`RateLimitInterceptor`].

use crate::error::InterceptError;
use crate::identity::IdentityFn;
use crate::interceptor::RateLimitInterceptor;
use crate::quota::QuotaAuthority;
use crate::response::ResponseFactory;
use crate::telemetry::TelemetrySink;
use http::{Request, Response};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that enforces quotas using a shared [`RateLimitInterceptor`].
///
/// Every service produced by this layer shares one interceptor, so
/// [`set_limit_period`](RateLimitInterceptor::set_limit_period) through
/// [`interceptor`](Self::interceptor) affects all of them.
pub struct RateLimitLayer<A, I, F, T> {
    interceptor: Arc<RateLimitInterceptor<A, I, F, T>>,
}

impl<A, I, F, T> RateLimitLayer<A, I, F, T> {
    pub fn new(interceptor: RateLimitInterceptor<A, I, F, T>) -> Self {
        Self { interceptor: Arc::new(interceptor) }
    }

    /// Build from an interceptor the caller keeps a handle to.
    pub fn from_shared(interceptor: Arc<RateLimitInterceptor<A, I, F, T>>) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &Arc<RateLimitInterceptor<A, I, F, T>> {
        &self.interceptor
    }
}

impl<A, I, F, T> Clone for RateLimitLayer<A, I, F, T> {
    fn clone(&self) -> Self {
        Self { interceptor: self.interceptor.clone() }
    }
}

impl<A: fmt::Debug, I, F, T> fmt::Debug for RateLimitLayer<A, I, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitLayer").field("interceptor", &self.interceptor).finish()
    }
}

impl<S, A, I, F, T> Layer<S> for RateLimitLayer<A, I, F, T> {
    type Service = RateLimitService<S, A, I, F, T>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, interceptor: self.interceptor.clone() }
    }
}

/// Middleware service that gates and annotates every request.
pub struct RateLimitService<S, A, I, F, T> {
    inner: S,
    interceptor: Arc<RateLimitInterceptor<A, I, F, T>>,
}

impl<S: Clone, A, I, F, T> Clone for RateLimitService<S, A, I, F, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), interceptor: self.interceptor.clone() }
    }
}

impl<S: fmt::Debug, A: fmt::Debug, I, F, T> fmt::Debug for RateLimitService<S, A, I, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("interceptor", &self.interceptor)
            .finish()
    }
}

impl<S, A, I, F, T> RateLimitService<S, A, I, F, T> {
    pub fn interceptor(&self) -> &Arc<RateLimitInterceptor<A, I, F, T>> {
        &self.interceptor
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, A, I, F, T, ReqB, ResB> Service<Request<ReqB>> for RateLimitService<S, A, I, F, T>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    A: QuotaAuthority + 'static,
    I: IdentityFn<ReqB> + 'static,
    F: ResponseFactory<ResB> + 'static,
    T: TelemetrySink + Sync,
    ReqB: Send + 'static,
    ResB: Send + 'static,
{
    type Response = Response<ResB>;
    type Error = InterceptError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(InterceptError::Inner)
    }

    fn call(&mut self, req: Request<ReqB>) -> Self::Future {
        // Hand the readied service to this call and keep a fresh clone for the next.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move { interceptor.process(req, inner).await })
    }
}
