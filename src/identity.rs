//! Bucket identity derivation.
//!
//! An [`IdentityFn`] maps a request to the key its quota is tracked under, or to
//! `None` when the request must bypass rate limiting entirely. Skipping is a hard
//! bypass: no authority call, no headers.
//!
//! Strategies provided here:
//! - [`from_fn`] / [`try_from_fn`]: arbitrary closures over the request
//! - [`from_sentinel`]: closures returning a `String`, where `""` means skip
//! - [`from_header`]: the value of one request header
//! - [`fixed`]: one global bucket for every request

use crate::error::BoxError;
use http::{HeaderName, Request};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Non-empty key of a quota bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Wrap a key. The empty string yields `None`, which means "do not rate-limit".
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives a bucket identity from a request.
///
/// `Ok(None)` skips rate limiting for the request. `Err` is fatal for that
/// request and surfaces as [`InterceptError::Identity`](crate::InterceptError::Identity).
pub trait IdentityFn<B>: Send + Sync {
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError>;
}

impl<B, I> IdentityFn<B> for Arc<I>
where
    I: IdentityFn<B> + ?Sized,
{
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        (**self).identify(request)
    }
}

/// Infallible closure strategy. See [`from_fn`].
pub struct FromFn<F, B> {
    f: F,
    _body: PhantomData<fn(&B)>,
}

/// Build a strategy from a closure returning `Option<Identity>`.
///
/// ```rust
/// use quotagate::identity::{self, Identity, IdentityFn};
/// use http::Request;
///
/// let by_path = identity::from_fn(|req: &Request<()>| Identity::new(req.uri().path()));
/// let req = Request::builder().uri("/api").body(()).unwrap();
/// assert_eq!(by_path.identify(&req).unwrap().unwrap().as_str(), "/api");
/// ```
pub fn from_fn<B, F>(f: F) -> FromFn<F, B>
where
    F: Fn(&Request<B>) -> Option<Identity> + Send + Sync,
{
    FromFn { f, _body: PhantomData }
}

impl<B, F> IdentityFn<B> for FromFn<F, B>
where
    F: Fn(&Request<B>) -> Option<Identity> + Send + Sync,
{
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        Ok((self.f)(request))
    }
}

impl<F: Clone, B> Clone for FromFn<F, B> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone(), _body: PhantomData }
    }
}

impl<F, B> fmt::Debug for FromFn<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromFn").finish_non_exhaustive()
    }
}

/// Fallible closure strategy. See [`try_from_fn`].
pub struct TryFromFn<F, B> {
    f: F,
    _body: PhantomData<fn(&B)>,
}

/// Build a strategy from a closure that may fail.
pub fn try_from_fn<B, F, E>(f: F) -> TryFromFn<F, B>
where
    F: Fn(&Request<B>) -> Result<Option<Identity>, E> + Send + Sync,
    E: Into<BoxError>,
{
    TryFromFn { f, _body: PhantomData }
}

impl<B, F, E> IdentityFn<B> for TryFromFn<F, B>
where
    F: Fn(&Request<B>) -> Result<Option<Identity>, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        (self.f)(request).map_err(Into::into)
    }
}

impl<F: Clone, B> Clone for TryFromFn<F, B> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone(), _body: PhantomData }
    }
}

impl<F, B> fmt::Debug for TryFromFn<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryFromFn").finish_non_exhaustive()
    }
}

/// Closure strategy using the empty-string convention. See [`from_sentinel`].
pub struct FromSentinel<F, B> {
    f: F,
    _body: PhantomData<fn(&B)>,
}

/// Build a strategy from a closure returning a bucket name, where `""` skips.
pub fn from_sentinel<B, F, S>(f: F) -> FromSentinel<F, B>
where
    F: Fn(&Request<B>) -> S + Send + Sync,
    S: Into<String>,
{
    FromSentinel { f, _body: PhantomData }
}

impl<B, F, S> IdentityFn<B> for FromSentinel<F, B>
where
    F: Fn(&Request<B>) -> S + Send + Sync,
    S: Into<String>,
{
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        Ok(Identity::new((self.f)(request)))
    }
}

impl<F: Clone, B> Clone for FromSentinel<F, B> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone(), _body: PhantomData }
    }
}

impl<F, B> fmt::Debug for FromSentinel<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromSentinel").finish_non_exhaustive()
    }
}

/// Header value strategy. See [`from_header`].
#[derive(Debug, Clone)]
pub struct HeaderIdentity {
    name: HeaderName,
}

/// Use the value of `name` as the identity (e.g. an API key header).
///
/// Surrounding whitespace is trimmed, so `" key "` and `"key"` share a bucket.
/// Missing headers, empty values and values of only whitespace skip rate
/// limiting. A value that isn't visible ASCII is an identity failure rather
/// than a silent skip.
pub fn from_header(name: HeaderName) -> HeaderIdentity {
    HeaderIdentity { name }
}

impl HeaderIdentity {
    pub fn header_name(&self) -> &HeaderName {
        &self.name
    }
}

impl<B> IdentityFn<B> for HeaderIdentity {
    fn identify(&self, request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        match request.headers().get(&self.name) {
            None => Ok(None),
            Some(value) => {
                let value = value.to_str().map_err(|e| {
                    format!("header {} is not a valid identity: {}", self.name, e)
                })?;
                Ok(Identity::new(value.trim()))
            }
        }
    }
}

/// Same-bucket strategy. See [`fixed`].
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    identity: Option<Identity>,
}

/// Every request consumes from one shared bucket named `key`.
/// `fixed("")` skips every request.
pub fn fixed(key: impl Into<String>) -> FixedIdentity {
    FixedIdentity { identity: Identity::new(key) }
}

impl<B> IdentityFn<B> for FixedIdentity {
    fn identify(&self, _request: &Request<B>) -> Result<Option<Identity>, BoxError> {
        Ok(self.identity.clone())
    }
}
