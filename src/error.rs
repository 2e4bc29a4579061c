//! Error types for the rate-limit interceptor

/// Boxed error returned by quota authorities and identity strategies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while constructing an interceptor.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The limit period must be at least one second.
    #[error("limit period must be > 0 seconds (got {0})")]
    InvalidLimitPeriod(u64),
}

/// Errors surfaced by [`RateLimitInterceptor::process`](crate::RateLimitInterceptor::process)
/// and by the tower service.
///
/// None of these are recovered locally: the interceptor never substitutes an
/// admit or reject decision for a failed lookup. Hosts decide how to render them
/// (usually a 5xx).
#[derive(thiserror::Error, Debug)]
pub enum InterceptError<E> {
    /// The identity strategy failed to derive a bucket key.
    #[error("identity derivation failed: {0}")]
    Identity(#[source] BoxError),
    /// The quota authority failed during `consume` or `limit`.
    #[error("quota authority failed: {0}")]
    Authority(#[source] BoxError),
    /// The downstream service failed.
    #[error("{0}")]
    Inner(#[source] E),
}

impl<E> InterceptError<E> {
    /// Check if the identity strategy failed.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    /// Check if the quota authority failed.
    pub fn is_authority(&self) -> bool {
        matches!(self, Self::Authority(_))
    }

    /// Check if this error wraps a downstream error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the downstream error if this is an `Inner` variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the downstream error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
