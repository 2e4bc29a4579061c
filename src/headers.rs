//! `X-Rate-Limit-*` response headers.

use crate::quota::QuotaDecision;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Response;

/// Nominal maximum requests per configured period.
pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
/// Units left after this request's consumption attempt.
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
/// Epoch seconds at which the bucket is expected to have capacity again.
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

/// Attach all three quota headers, replacing any previous values.
pub fn annotate<B>(mut response: Response<B>, decision: &QuotaDecision) -> Response<B> {
    let headers = response.headers_mut();
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_at));
    response
}

/// Parse `(limit, remaining, reset)` back out of a header map.
///
/// Returns `None` unless all three are present and numeric.
pub fn read(headers: &HeaderMap) -> Option<(u64, u64, u64)> {
    let get = |name: &HeaderName| headers.get(name)?.to_str().ok()?.parse::<u64>().ok();
    Some((get(&X_RATE_LIMIT_LIMIT)?, get(&X_RATE_LIMIT_REMAINING)?, get(&X_RATE_LIMIT_RESET)?))
}

/// True if any quota header is present.
pub fn has_any(headers: &HeaderMap) -> bool {
    [X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET]
        .iter()
        .any(|name| headers.contains_key(name))
}
