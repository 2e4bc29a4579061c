//! Factories for responses the interceptor synthesizes itself (the 429).

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use std::sync::Arc;

/// Reason phrase used for rejected requests.
pub const TOO_MANY_REQUESTS_REASON: &str = "Too Many Requests";

/// Builds a response with the given status and reason phrase.
pub trait ResponseFactory<B>: Send + Sync {
    fn create_response(&self, status: StatusCode, reason: &str) -> Response<B>;
}

impl<B, F> ResponseFactory<B> for Arc<F>
where
    F: ResponseFactory<B> + ?Sized,
{
    fn create_response(&self, status: StatusCode, reason: &str) -> Response<B> {
        (**self).create_response(status, reason)
    }
}

/// Status-only responses with an empty (`Default`) body.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResponseFactory;

impl<B: Default> ResponseFactory<B> for DefaultResponseFactory {
    fn create_response(&self, status: StatusCode, _reason: &str) -> Response<B> {
        let mut response = Response::new(B::default());
        *response.status_mut() = status;
        response
    }
}

/// Responses whose body is the reason phrase as `text/plain`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextResponseFactory;

impl<B: From<String>> ResponseFactory<B> for PlainTextResponseFactory {
    fn create_response(&self, status: StatusCode, reason: &str) -> Response<B> {
        let mut response = Response::new(B::from(reason.to_owned()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }
}
