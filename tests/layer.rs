mod common;

use common::{counting_handler, get, CapacityAuthority};
use http::{Request, Response, StatusCode};
use quotagate::headers;
use quotagate::identity;
use quotagate::quota::RecordingAuthority;
use quotagate::{
    InterceptError, LimitPeriod, PlainTextResponseFactory, RateLimitInterceptor, RateLimitLayer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_bucket() {
    let authority = CapacityAuthority::new(5, 42);
    let interceptor = RateLimitInterceptor::new(authority.clone(), identity::fixed("shared"));
    let calls = Arc::new(AtomicUsize::new(0));
    let svc = ServiceBuilder::new()
        .layer(RateLimitLayer::new(interceptor))
        .service(counting_handler(calls.clone()));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move { svc.oneshot(get("/")).await }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in futures::future::join_all(handles).await {
        let response = handle.unwrap().unwrap();
        assert!(headers::read(response.headers()).is_some());
        match response.status() {
            StatusCode::OK => admitted += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(rejected, 15);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(authority.used("shared"), 5);
}

#[tokio::test]
async fn period_update_through_layer_handle() {
    let authority = RecordingAuthority::new(10);
    let layer = RateLimitLayer::new(RateLimitInterceptor::new(
        authority.clone(),
        identity::fixed("client"),
    ));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut svc = layer.layer(counting_handler(calls));

    ServiceExt::<Request<()>>::ready(&mut svc).await.unwrap();
    svc.call(get("/")).await.unwrap();
    layer.interceptor().set_limit_period(LimitPeriod::new(60).unwrap());
    ServiceExt::<Request<()>>::ready(&mut svc).await.unwrap();
    svc.call(get("/")).await.unwrap();

    let periods: Vec<u64> = authority.limit_calls().iter().map(LimitPeriod::as_secs).collect();
    assert_eq!(periods, vec![3600, 60]);
}

#[tokio::test]
async fn rejected_response_uses_configured_factory() {
    let interceptor = RateLimitInterceptor::builder(
        CapacityAuthority::new(0, 7),
        identity::fixed("client"),
    )
    .response_factory(PlainTextResponseFactory)
    .build()
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let svc = RateLimitLayer::new(interceptor).layer(counting_handler(calls.clone()));

    let response = svc.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body(), "Too Many Requests");
    assert_eq!(headers::read(response.headers()), Some((0, 0, 7)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn downstream_errors_are_wrapped() {
    let svc = ServiceBuilder::new()
        .layer(RateLimitLayer::new(RateLimitInterceptor::new(
            RecordingAuthority::new(10),
            identity::fixed("client"),
        )))
        .service_fn(|_req: Request<()>| async {
            Err::<Response<String>, _>(std::io::Error::new(std::io::ErrorKind::Other, "db down"))
        });

    match svc.oneshot(get("/")).await {
        Err(InterceptError::Inner(e)) => assert_eq!(e.to_string(), "db down"),
        other => panic!("expected inner error, got {other:?}"),
    }
}
