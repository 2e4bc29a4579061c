use crate::config::LimitPeriod;
use crate::error::BoxError;
use crate::identity::Identity;
use crate::quota::{Consumption, QuotaAuthority};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Test double that answers from a script and records every call.
///
/// Scripted consumptions are returned in order; once the script runs out the
/// fallback consumption is returned (admit, `remaining = limit - 1`, reset 0,
/// unless overridden). Clones share the same script and call log.
///
/// The call log grows by one entry per `consume` and `limit` until
/// [`clear`](Self::clear) is called, and nothing is enforced. Do not put it in
/// front of real traffic; implement [`QuotaAuthority`] over your quota store.
#[derive(Debug, Clone)]
pub struct RecordingAuthority {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
struct State {
    limit: u64,
    script: VecDeque<Consumption>,
    fallback: Consumption,
    fail_consume: Option<String>,
    fail_limit: Option<String>,
    consume_calls: Vec<(Identity, LimitPeriod)>,
    limit_calls: Vec<LimitPeriod>,
}

impl RecordingAuthority {
    pub fn new(limit: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                limit,
                script: VecDeque::new(),
                fallback: Consumption::admitted(limit.saturating_sub(1), 0),
                fail_consume: None,
                fail_limit: None,
                consume_calls: Vec::new(),
                limit_calls: Vec::new(),
            })),
        }
    }

    /// Queue consumptions to return before the fallback.
    pub fn with_script<I>(self, script: I) -> Self
    where
        I: IntoIterator<Item = Consumption>,
    {
        self.state.lock().unwrap().script.extend(script);
        self
    }

    /// Answer returned once the script is exhausted.
    pub fn with_fallback(self, fallback: Consumption) -> Self {
        self.state.lock().unwrap().fallback = fallback;
        self
    }

    /// Make every `consume` call fail with `message`.
    pub fn failing_consume(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().fail_consume = Some(message.into());
        self
    }

    /// Make every `limit` call fail with `message`.
    pub fn failing_limit(self, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().fail_limit = Some(message.into());
        self
    }

    pub fn consume_calls(&self) -> Vec<(Identity, LimitPeriod)> {
        self.state.lock().unwrap().consume_calls.clone()
    }

    pub fn limit_calls(&self) -> Vec<LimitPeriod> {
        self.state.lock().unwrap().limit_calls.clone()
    }

    /// Total calls of either kind.
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.consume_calls.len() + state.limit_calls.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.consume_calls.clear();
        state.limit_calls.clear();
    }
}

#[async_trait]
impl QuotaAuthority for RecordingAuthority {
    async fn consume(
        &self,
        identity: &Identity,
        period: LimitPeriod,
    ) -> Result<Consumption, BoxError> {
        let mut state = self.state.lock().unwrap();
        state.consume_calls.push((identity.clone(), period));
        if let Some(msg) = &state.fail_consume {
            return Err(msg.clone().into());
        }
        let fallback = state.fallback;
        Ok(state.script.pop_front().unwrap_or(fallback))
    }

    async fn limit(&self, period: LimitPeriod) -> Result<u64, BoxError> {
        let mut state = self.state.lock().unwrap();
        state.limit_calls.push(period);
        if let Some(msg) = &state.fail_limit {
            return Err(msg.clone().into());
        }
        Ok(state.limit)
    }
}
