//! Scripted transport double for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::{AgentCallRequest, AgentCallResponse, CallStatus, Transport};
use crate::error::TransportError;

/// Scripted per-call outcome, keyed by the target agent's port.
pub(crate) enum FakeOutcome {
    Ok(String),
    AppError(String),
    ConnectionError,
    ServerError(u16),
    Rejected(u16),
    /// Never completes; resolved only by the caller's timeout or cancellation.
    Hang,
}

pub(crate) struct FakeTransport {
    call_scripts: Mutex<HashMap<u16, VecDeque<FakeOutcome>>>,
    probe_scripts: Mutex<HashMap<u16, VecDeque<bool>>>,
    calls: AtomicUsize,
    probes: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            call_scripts: Mutex::new(HashMap::new()),
            probe_scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    /// Queue call outcomes for the agent listening on `port`. Unscripted
    /// calls succeed with an empty payload.
    pub(crate) fn script_calls(&self, port: u16, outcomes: Vec<FakeOutcome>) {
        self.call_scripts
            .lock()
            .unwrap()
            .entry(port)
            .or_default()
            .extend(outcomes);
    }

    /// Queue probe outcomes for the agent listening on `port`. Unscripted
    /// probes succeed.
    pub(crate) fn script_probes(&self, port: u16, outcomes: Vec<bool>) {
        self.probe_scripts
            .lock()
            .unwrap()
            .entry(port)
            .or_default()
            .extend(outcomes);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn next_call(&self, port: u16) -> Option<FakeOutcome> {
        self.call_scripts
            .lock()
            .unwrap()
            .get_mut(&port)
            .and_then(|queue| queue.pop_front())
    }

    fn next_probe(&self, port: u16) -> Option<bool> {
        self.probe_scripts
            .lock()
            .unwrap()
            .get_mut(&port)
            .and_then(|queue| queue.pop_front())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(
        &self,
        address: &Url,
        _request: &AgentCallRequest,
    ) -> Result<AgentCallResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let port = address.port().unwrap_or(0);

        match self.next_call(port) {
            Some(FakeOutcome::Ok(payload)) => Ok(AgentCallResponse {
                status: CallStatus::Ok,
                payload,
            }),
            Some(FakeOutcome::AppError(payload)) => Ok(AgentCallResponse {
                status: CallStatus::Error,
                payload,
            }),
            Some(FakeOutcome::ConnectionError) => {
                Err(TransportError::Connection("connection refused".to_string()))
            }
            Some(FakeOutcome::ServerError(status)) => Err(TransportError::ServerError { status }),
            Some(FakeOutcome::Rejected(status)) => Err(TransportError::Rejected { status }),
            Some(FakeOutcome::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(AgentCallResponse {
                status: CallStatus::Ok,
                payload: "{}".to_string(),
            }),
        }
    }

    async fn probe(&self, address: &Url) -> Result<(), TransportError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let port = address.port().unwrap_or(0);

        match self.next_probe(port) {
            Some(true) | None => Ok(()),
            Some(false) => Err(TransportError::Connection("unreachable".to_string())),
        }
    }
}
