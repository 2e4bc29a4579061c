mod common;

use common::{counting_handler, get, CapacityAuthority};
use quotagate::identity;
use quotagate::quota::RecordingAuthority;
use quotagate::telemetry::{LogSink, MemorySink, NonBlockingSink, QuotaEvent, TelemetrySink};
use quotagate::RateLimitInterceptor;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::Service;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);
impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture() -> (Arc<Mutex<Vec<u8>>>, tracing::subscriber::DefaultGuard) {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

fn logs(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
}

#[tokio::test]
async fn memory_sink_records_one_event_per_request() {
    let sink = MemorySink::new();
    let authority = CapacityAuthority::new(1, 9);
    let interceptor = RateLimitInterceptor::builder(authority, identity::fixed("X"))
        .telemetry(sink.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    interceptor.process(get("/"), counting_handler(calls.clone())).await.unwrap();
    interceptor.process(get("/"), counting_handler(calls.clone())).await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    match &events[0] {
        QuotaEvent::Admitted { identity, decision } => {
            assert_eq!(identity.as_str(), "X");
            assert_eq!((decision.limit, decision.remaining, decision.reset_at), (1, 0, 9));
        }
        other => panic!("expected admitted, got {other:?}"),
    }
    assert!(events[1].is_rejected());
}

#[tokio::test]
async fn skipped_requests_emit_skip_event() {
    let sink = MemorySink::new();
    let authority = RecordingAuthority::new(1);
    let interceptor = RateLimitInterceptor::builder(authority.clone(), identity::fixed(""))
        .telemetry(sink.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    interceptor.process(get("/"), counting_handler(calls.clone())).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(authority.total_calls(), 0);
    assert_eq!(sink.events(), vec![QuotaEvent::Skipped]);
}

#[tokio::test]
async fn authority_failure_is_logged_and_emitted() {
    let (buffer, _guard) = capture();
    let sink = MemorySink::new();
    let interceptor = RateLimitInterceptor::builder(
        RecordingAuthority::new(1).failing_limit("backend timeout"),
        identity::fixed("client-9"),
    )
    .telemetry(sink.clone())
    .build()
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let result = interceptor.process(get("/"), counting_handler(calls)).await;
    assert!(result.is_err());

    let out = logs(&buffer);
    assert!(out.contains("quota authority failed"), "logs: {out}");
    assert!(out.contains("backend timeout"), "logs: {out}");
    assert!(matches!(
        sink.events().as_slice(),
        [QuotaEvent::AuthorityFailed { error, .. }] if error == "backend timeout"
    ));
}

#[tokio::test]
async fn rejection_is_logged_with_quota_fields() {
    let (buffer, _guard) = capture();
    let interceptor =
        RateLimitInterceptor::builder(CapacityAuthority::new(0, 77), identity::fixed("client-7"))
            .telemetry(LogSink)
            .build()
            .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    interceptor.process(get("/"), counting_handler(calls)).await.unwrap();

    let out = logs(&buffer);
    assert!(out.contains("request rejected"), "logs: {out}");
    assert!(out.contains("identity=client-7"), "logs: {out}");
    assert!(out.contains("reset=77"), "logs: {out}");
    assert!(out.contains("quota_event rejected"), "logs: {out}");
    assert!(out.contains("WARN"), "logs: {out}");
}

/// Records into a [`MemorySink`] only after the gate hands out a permit.
#[derive(Clone)]
struct GatedSink {
    gate: Arc<Semaphore>,
    memory: MemorySink,
}

impl Service<QuotaEvent> for GatedSink {
    type Response = ();
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: QuotaEvent) -> Self::Future {
        let gate = self.gate.clone();
        let mut memory = self.memory.clone();
        Box::pin(async move {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            memory.call(event).await
        })
    }
}

impl TelemetrySink for GatedSink {
    type SinkError = Infallible;
}

#[tokio::test]
async fn slow_sink_behind_non_blocking_queue_does_not_delay_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let memory = MemorySink::new();
    let slow = GatedSink { gate: gate.clone(), memory: memory.clone() };
    let queue = NonBlockingSink::with_capacity(slow, 16);
    let authority = CapacityAuthority::new(5, 1);
    let interceptor = RateLimitInterceptor::builder(authority, identity::fixed("a"))
        .telemetry(queue.clone())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let response = tokio::time::timeout(
            Duration::from_secs(1),
            interceptor.process(get("/"), counting_handler(calls.clone())),
        )
        .await
        .expect("request finished while the sink was blocked")
        .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(memory.is_empty());

    gate.add_permits(3);
    tokio::time::timeout(Duration::from_secs(1), async {
        while memory.len() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("queued events delivered once the sink unblocked");

    assert_eq!(queue.dropped(), 0);
    assert_eq!(interceptor.dropped_events(), 0);
}
