//! Scriptable in-memory accrual client for tests and local runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::OrderNumber;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::client::AccrualClient;
use crate::error::{AccrualError, Result};
use crate::model::{AccrualReply, AccrualResponse, AccrualStatus};

/// A reply the scripted client will produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Found {
        status: AccrualStatus,
        accrual: Option<Decimal>,
    },
    NotRegistered,
    RateLimited(Option<Duration>),
    /// Fails with an unexpected 500 carrying this body.
    Fail(String),
}

impl ScriptedReply {
    pub fn found(status: AccrualStatus, accrual: Option<Decimal>) -> Self {
        Self::Found { status, accrual }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    /// Replies consumed once, in order, before falling back to `fixed`.
    queued: HashMap<String, VecDeque<ScriptedReply>>,
    fixed: HashMap<String, ScriptedReply>,
    calls: Vec<String>,
    latency: Duration,
}

/// In-memory accrual client.
///
/// Orders without a script reply `NotRegistered`, like the real service
/// does for numbers it has never seen.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAccrualClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedAccrualClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reply returned for `number` on every call.
    pub fn set_reply(&self, number: &str, reply: ScriptedReply) {
        self.state.lock().fixed.insert(number.to_string(), reply);
    }

    /// Queues a one-shot reply for `number`, served before the fixed one.
    pub fn push_reply(&self, number: &str, reply: ScriptedReply) {
        self.state
            .lock()
            .queued
            .entry(number.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Adds an artificial delay to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Total number of calls made.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of calls made for one order.
    pub fn calls_for(&self, number: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|n| n.as_str() == number)
            .count()
    }

    /// Order numbers in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl AccrualClient for ScriptedAccrualClient {
    async fn get_order_accrual(&self, number: &OrderNumber) -> Result<AccrualReply> {
        let (reply, latency) = {
            let mut state = self.state.lock();
            state.calls.push(number.to_string());
            let queued = state
                .queued
                .get_mut(number.as_str())
                .and_then(VecDeque::pop_front);
            let reply = queued
                .or_else(|| state.fixed.get(number.as_str()).cloned())
                .unwrap_or(ScriptedReply::NotRegistered);
            (reply, state.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            ScriptedReply::Found { status, accrual } => Ok(AccrualReply::Found(AccrualResponse {
                order: number.to_string(),
                status,
                accrual,
            })),
            ScriptedReply::NotRegistered => Ok(AccrualReply::NotRegistered),
            ScriptedReply::RateLimited(retry_after) => Ok(AccrualReply::RateLimited { retry_after }),
            ScriptedReply::Fail(body) => Err(AccrualError::UnexpectedStatus { status: 500, body }),
        }
    }
}
