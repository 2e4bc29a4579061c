//! Telemetry for quota decisions.
//!
//! Every processed request produces one [`QuotaEvent`]. Sinks are plain
//! `tower::Service<QuotaEvent>`s, so they compose with tower combinators.
//!
//! The interceptor hands events over with [`try_emit`], which never waits: a
//! sink that is not ready on the first poll, or whose call does not finish on
//! the first poll, loses the event. Sinks that do real I/O belong behind a
//! [`NonBlockingSink`], which queues events on a bounded channel and delivers
//! them from a background task.
//!
//! ```rust
//! use quotagate::telemetry::{try_emit, MemorySink, QuotaEvent};
//!
//! let mut sink = MemorySink::new();
//! assert!(try_emit(&mut sink, QuotaEvent::Skipped));
//! assert_eq!(sink.len(), 1);
//! ```

use crate::identity::Identity;
use crate::quota::QuotaDecision;
use futures::future::{ready, Ready};
use futures::FutureExt;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};

/// Outcome of one pass through the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaEvent {
    /// The identity strategy returned no identity; nothing was consumed.
    Skipped,
    /// The authority admitted the request.
    Admitted { identity: Identity, decision: QuotaDecision },
    /// The authority rejected the request; a 429 was synthesized.
    Rejected { identity: Identity, decision: QuotaDecision },
    /// `consume` or `limit` failed.
    AuthorityFailed { identity: Identity, error: String },
}

impl QuotaEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Skipped => None,
            Self::Admitted { identity, .. }
            | Self::Rejected { identity, .. }
            | Self::AuthorityFailed { identity, .. } => Some(identity),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl fmt::Display for QuotaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "quota skipped"),
            Self::Admitted { identity, decision } => write!(
                f,
                "quota admitted {} (limit={}, remaining={}, reset={})",
                identity, decision.limit, decision.remaining, decision.reset_at
            ),
            Self::Rejected { identity, decision } => write!(
                f,
                "quota rejected {} (limit={}, remaining={}, reset={})",
                identity, decision.limit, decision.remaining, decision.reset_at
            ),
            Self::AuthorityFailed { identity, error } => {
                write!(f, "quota authority failed for {}: {}", identity, error)
            }
        }
    }
}

/// A sink for quota events.
///
/// Implementations must not assume every event arrives; see [`try_emit`].
pub trait TelemetrySink:
    Service<QuotaEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    type SinkError: std::error::Error + Send + 'static;
}

/// Offer `event` to `sink` without waiting.
///
/// Polls readiness once and the call future once. Returns `false` when the
/// event was dropped because either poll was pending or the sink failed.
pub fn try_emit<S>(sink: &mut S, event: QuotaEvent) -> bool
where
    S: Service<QuotaEvent, Response = ()>,
{
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    match sink.poll_ready(&mut cx) {
        Poll::Ready(Ok(())) => matches!(sink.call(event).now_or_never(), Some(Ok(()))),
        Poll::Ready(Err(_)) | Poll::Pending => false,
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Service<QuotaEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: QuotaEvent) -> Self::Future {
        ready(Ok(()))
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// Writes each event as a structured `tracing` record.
///
/// Rejections and authority failures are logged at `warn`, everything else at
/// `debug`, so a production filter of `info` only shows the interesting ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Service<QuotaEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: QuotaEvent) -> Self::Future {
        let identity = event.identity().map(Identity::as_str).unwrap_or_default();
        match &event {
            QuotaEvent::Rejected { decision, .. } => tracing::warn!(
                identity,
                limit = decision.limit,
                remaining = decision.remaining,
                reset = decision.reset_at,
                "quota_event rejected"
            ),
            QuotaEvent::AuthorityFailed { error, .. } => {
                tracing::warn!(identity, error = %error, "quota_event authority_failed")
            }
            QuotaEvent::Admitted { decision, .. } => tracing::debug!(
                identity,
                limit = decision.limit,
                remaining = decision.remaining,
                "quota_event admitted"
            ),
            QuotaEvent::Skipped => tracing::debug!("quota_event skipped"),
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct Ring {
    events: VecDeque<QuotaEvent>,
    capacity: usize,
    evicted: u64,
}

/// Keeps the most recent events in memory. Useful in tests and debug endpoints.
#[derive(Clone, Debug)]
pub struct MemorySink {
    ring: Arc<Mutex<Ring>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Retain at most `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let events = VecDeque::with_capacity(capacity.min(1024));
        Self { ring: Arc::new(Mutex::new(Ring { events, capacity, evicted: 0 })) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        // A panic while holding the lock leaves the ring intact; keep using it.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the retained events, oldest first.
    pub fn events(&self) -> Vec<QuotaEvent> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn rejections(&self) -> usize {
        self.lock().events.iter().filter(|e| e.is_rejected()).count()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Events pushed out to stay within capacity.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<QuotaEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: QuotaEvent) -> Self::Future {
        let mut ring = self.lock();
        if ring.events.len() >= ring.capacity {
            ring.events.pop_front();
            ring.evicted += 1;
        }
        ring.events.push_back(event);
        ready(Ok(()))
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

/// Decouples a slow sink from the request path.
///
/// `call` does a `try_send` on a bounded channel and always completes
/// immediately; a full queue drops the event and bumps [`dropped`](Self::dropped).
/// A worker task owns the wrapped sink and delivers queued events in order,
/// waiting on its readiness as long as it needs. The worker exits once every
/// handle is dropped and the queue is drained.
#[derive(Clone, Debug)]
pub struct NonBlockingSink {
    tx: mpsc::Sender<QuotaEvent>,
    dropped: Arc<AtomicU64>,
}

impl NonBlockingSink {
    /// Spawn the delivery worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, or if `capacity` is 0.
    pub fn with_capacity<S>(sink: S, capacity: usize) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(capacity);
        tokio::spawn(async move {
            let mut sink = sink;
            while let Some(event) = rx.recv().await {
                let delivered = match sink.ready().await {
                    Ok(svc) => svc.call(event).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = delivered {
                    tracing::debug!(error = %e, "telemetry delivery failed");
                }
            }
        });
        Self { tx, dropped: Arc::new(AtomicU64::new(0)) }
    }

    /// Events refused because the queue was full or the worker had stopped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Service<QuotaEvent> for NonBlockingSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: QuotaEvent) -> Self::Future {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for NonBlockingSink {
    type SinkError = Infallible;
}
