//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use polymarket_ingest::InstrumentId;
use polymarket_ingest::application::ports::{
    Credentials, MarketTransport, StaticWatchList, TransportError,
};
use polymarket_ingest::domain::streaming::{ConnectionState, FeedEvent, Frame};
use polymarket_ingest::domain::subscription::WatchedInstrument;
use polymarket_ingest::infrastructure::polymarket::{
    Supervisor, SupervisorConfig, SupervisorHandle,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A call the supervisor made on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Authenticate { with_credentials: bool },
    Subscribe(Vec<String>),
    KeepAlive,
    Pong,
    Close,
}

/// Test-side controls for a [`ScriptedTransport`].
#[derive(Clone)]
pub struct Script {
    open_results: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    subscribe_results: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Script {
    /// Queue the result of the next `open`. Unscripted opens succeed.
    pub fn push_open(&self, result: Result<(), TransportError>) {
        self.open_results.lock().push_back(result);
    }

    /// Queue `count` failing opens.
    pub fn fail_opens(&self, count: usize) {
        for _ in 0..count {
            self.push_open(Err(connect_refused()));
        }
    }

    /// Queue the result of the next `subscribe`. Unscripted subscribes succeed.
    pub fn push_subscribe(&self, result: Result<(), TransportError>) {
        self.subscribe_results.lock().push_back(result);
    }

    /// Deliver an inbound frame to the current session.
    pub fn deliver(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// Deliver a JSON payload frame.
    pub fn deliver_json(&self, value: serde_json::Value) {
        self.deliver(Frame::Payload(value));
    }

    /// Deliver a receive error.
    pub fn deliver_error(&self, error: TransportError) {
        let _ = self.inbound.send(Err(error));
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.calls().iter().filter(|c| **c == Call::Open).count()
    }

    /// Instrument lists of every subscribe frame, in order.
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Subscribe(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }
}

/// Transport whose outcomes are scripted by the test.
///
/// `receive` blocks until the test delivers a frame.
pub struct ScriptedTransport {
    script: Script,
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, Script) {
        let (tx, rx) = mpsc::unbounded_channel();
        let script = Script {
            open_results: Arc::default(),
            subscribe_results: Arc::default(),
            inbound: tx,
            calls: Arc::default(),
        };
        (
            Self {
                script: script.clone(),
                inbound: rx,
            },
            script,
        )
    }

    fn record(&self, call: Call) {
        self.script.calls.lock().push(call);
    }
}

#[async_trait]
impl MarketTransport for ScriptedTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.record(Call::Open);
        self.script.open_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn authenticate(
        &mut self,
        credentials: Option<&Credentials>,
    ) -> Result<(), TransportError> {
        self.record(Call::Authenticate {
            with_credentials: credentials.is_some(),
        });
        Ok(())
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), TransportError> {
        self.record(Call::Subscribe(
            instruments.iter().map(|id| id.as_str().to_string()).collect(),
        ));
        self.script
            .subscribe_results
            .lock()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn send_keep_alive(&mut self) -> Result<(), TransportError> {
        self.record(Call::KeepAlive);
        Ok(())
    }

    async fn send_pong(&mut self) -> Result<(), TransportError> {
        self.record(Call::Pong);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        match self.inbound.recv().await {
            Some(step) => step,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.record(Call::Close);
    }
}

pub fn connect_refused() -> TransportError {
    TransportError::Connect {
        url: "wss://test".to_string(),
        message: "connection refused".to_string(),
    }
}

pub fn watch_list(entries: &[(&str, &str)]) -> Arc<StaticWatchList> {
    Arc::new(StaticWatchList::new(
        entries
            .iter()
            .map(|(id, market)| WatchedInstrument::new(*id, *market))
            .collect(),
    ))
}

/// A running supervisor over a scripted transport.
pub struct Harness {
    pub script: Script,
    pub handle: SupervisorHandle,
    pub events: mpsc::Receiver<FeedEvent>,
    pub cancel: CancellationToken,
    pub task: tokio::task::JoinHandle<()>,
}

impl Harness {
    pub fn start(config: SupervisorConfig, watch_list: Arc<StaticWatchList>) -> Self {
        let (transport, script) = ScriptedTransport::new();
        let (tx, events) = mpsc::channel(1024);
        let cancel = CancellationToken::new();
        let (supervisor, handle) =
            Supervisor::new(transport, watch_list, config, tx, cancel.clone());
        let task = tokio::spawn(supervisor.run());
        Self {
            script,
            handle,
            events,
            cancel,
            task,
        }
    }

    /// Next feed event, failing the test if none arrives within ten minutes.
    pub async fn next_event(&mut self) -> FeedEvent {
        tokio::time::timeout(Duration::from_secs(600), self.events.recv())
            .await
            .expect("timed out waiting for a feed event")
            .expect("feed closed")
    }

    /// Collect events up to and including `state`.
    pub async fn events_until_state(&mut self, state: ConnectionState) -> Vec<FeedEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = event == FeedEvent::StateChanged(state);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Collect events up to and including the first matching one.
    pub async fn events_until(&mut self, stop: impl Fn(&FeedEvent) -> bool) -> Vec<FeedEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = stop(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.task.await.expect("supervisor panicked");
    }
}

/// State transitions among `events`, in order.
pub fn states(events: &[FeedEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}
