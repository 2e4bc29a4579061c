#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderValue, Request, Response, StatusCode};
use quotagate::{BoxError, Consumption, Identity, LimitPeriod, QuotaAuthority};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::Service;

/// Fixed-capacity authority: every identity gets `capacity` units and nothing refills.
#[derive(Debug, Clone)]
pub struct CapacityAuthority {
    capacity: u64,
    reset_at: u64,
    used: Arc<Mutex<HashMap<Identity, u64>>>,
}

impl CapacityAuthority {
    pub fn new(capacity: u64, reset_at: u64) -> Self {
        Self { capacity, reset_at, used: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn used(&self, identity: &str) -> u64 {
        let id = Identity::new(identity).unwrap();
        self.used.lock().unwrap().get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl QuotaAuthority for CapacityAuthority {
    async fn consume(
        &self,
        identity: &Identity,
        _period: LimitPeriod,
    ) -> Result<Consumption, BoxError> {
        let mut used = self.used.lock().unwrap();
        let count = used.entry(identity.clone()).or_insert(0);
        if *count < self.capacity {
            *count += 1;
            Ok(Consumption::admitted(self.capacity - *count, self.reset_at))
        } else {
            Ok(Consumption::rejected(0, self.reset_at))
        }
    }

    async fn limit(&self, _period: LimitPeriod) -> Result<u64, BoxError> {
        Ok(self.capacity)
    }
}

/// Downstream that answers 200 and counts its invocations.
pub fn counting_handler(calls: Arc<AtomicUsize>) -> impl Service<
    Request<()>,
    Response = Response<String>,
    Error = Infallible,
    Future = impl Future<Output = Result<Response<String>, Infallible>> + Send + 'static,
> + Clone
       + Send
       + 'static {
    tower::service_fn(move |_req: Request<()>| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Response::new(String::from("ok")))
        }
    })
}

/// Downstream that answers 404 with its own `x-custom: 1` header.
pub fn not_found_handler(calls: Arc<AtomicUsize>) -> impl Service<
    Request<()>,
    Response = Response<String>,
    Error = Infallible,
    Future = impl Future<Output = Result<Response<String>, Infallible>> + Send + 'static,
> + Clone
       + Send
       + 'static {
    tower::service_fn(move |_req: Request<()>| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut response = Response::new(String::from("missing"));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response.headers_mut().insert("x-custom", HeaderValue::from_static("1"));
            Ok::<_, Infallible>(response)
        }
    })
}

pub fn get(uri: &str) -> Request<()> {
    Request::builder().method("GET").uri(uri).body(()).unwrap()
}
