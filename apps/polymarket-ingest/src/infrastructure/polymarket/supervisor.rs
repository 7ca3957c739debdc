//! Reconnection Supervisor
//!
//! Owns the market transport and drives the session lifecycle:
//!
//! ```text
//! open → authenticate → subscribe(desired) → Listening (keep-alive + receive)
//!   ↑                                            │
//!   └──── backoff min(2^n, cap) ◄── failure ─────┘
//! ```
//!
//! The supervisor is the single writer of the live subscription, the
//! retry counter and the connection state. Other tasks read snapshots
//! through [`SupervisorStatus`] and ask for changes through
//! [`SupervisorHandle`], whose requests are applied in arrival order.
//!
//! Every wait (connect, backoff, settle) is a `select!` branch next to the
//! cancellation token, so shutdown never waits on a timer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::keepalive::{KeepAliveConfig, KeepAliveEvent, KeepAliveManager, LivenessState};
use super::messages::ControlMessage;
use super::reconnect::{ReconnectConfig, ReconnectPolicy, RetryDecision};
use super::router::EventRouter;
use crate::application::ports::{
    ControlError, Credentials, IngestionControl, MarketTransport, TransportError, WatchListPort,
};
use crate::application::services::load_desired_set;
use crate::domain::book::InstrumentId;
use crate::domain::streaming::{ConnectionState, ControlToken, FeedEvent, Frame};
use crate::domain::subscription::DesiredSet;
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Why a session ended in failure. Every variant drives the backoff path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The connection could not be opened.
    #[error("connect failed: {0}")]
    Connect(TransportError),

    /// The auth frame could not be sent.
    #[error("auth frame failed: {0}")]
    Auth(TransportError),

    /// The subscribe frame could not be sent.
    #[error("subscribe failed: {0}")]
    Subscribe(TransportError),

    /// The venue rejected the subscription.
    #[error("subscription rejected: {error}")]
    SubscriptionRejected {
        /// Venue error text.
        error: String,
    },

    /// Nothing arrived within the timeout after a keep-alive.
    #[error("no frame within {0:?} after keep-alive")]
    KeepAliveTimeout(Duration),

    /// The transport failed while listening.
    #[error("transport failed while listening: {0}")]
    Transport(TransportError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Backoff law and retry budget.
    pub reconnect: ReconnectConfig,
    /// Keep-alive cadence and liveness timeout.
    pub keep_alive: KeepAliveConfig,
    /// Pause between teardown and rebuild on `restart`.
    pub restart_settle: Duration,
    /// Credentials for the optional auth frame.
    pub credentials: Option<Credentials>,
    /// Capacity of the request queue.
    pub request_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            keep_alive: KeepAliveConfig::default(),
            restart_settle: Duration::from_secs(1),
            credentials: None,
            request_capacity: 64,
        }
    }
}

// =============================================================================
// Shared Status
// =============================================================================

/// Read-only snapshot source for the supervisor's state.
#[derive(Debug, Default)]
pub struct SupervisorStatus {
    state: RwLock<ConnectionState>,
    live: RwLock<BTreeSet<InstrumentId>>,
    retry_count: AtomicU32,
    exhausted: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl SupervisorStatus {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Snapshot of the live subscription.
    #[must_use]
    pub fn live_subscription(&self) -> BTreeSet<InstrumentId> {
        self.live.read().clone()
    }

    /// Consecutive failures since the session last reached `Listening`.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    /// Whether the retry budget was spent and ingestion is idle.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// Most recent session failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Debug)]
enum SupervisorRequest {
    Activate(DesiredSet),
    Resubscribe(DesiredSet),
    Restart,
}

/// Cloneable handle for requesting supervisor actions.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    requests: mpsc::Sender<SupervisorRequest>,
    status: Arc<SupervisorStatus>,
}

impl SupervisorHandle {
    /// Shared status.
    #[must_use]
    pub fn status(&self) -> Arc<SupervisorStatus> {
        Arc::clone(&self.status)
    }

    async fn request(&self, request: SupervisorRequest) -> Result<(), ControlError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ControlError::SupervisorStopped)
    }
}

#[async_trait]
impl IngestionControl for SupervisorHandle {
    fn live_subscription(&self) -> BTreeSet<InstrumentId> {
        self.status.live_subscription()
    }

    async fn activate(&self, desired: DesiredSet) -> Result<(), ControlError> {
        self.request(SupervisorRequest::Activate(desired)).await
    }

    async fn resubscribe(&self, desired: DesiredSet) -> Result<(), ControlError> {
        self.request(SupervisorRequest::Resubscribe(desired)).await
    }

    async fn restart(&self) -> Result<(), ControlError> {
        self.request(SupervisorRequest::Restart).await
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// How a connect-to-teardown cycle ended.
enum CycleExit {
    /// Nothing to do until the next request.
    Idle,
    /// Start a fresh cycle with this set.
    Next(DesiredSet),
    /// Cancellation requested.
    Shutdown,
}

/// How a single session ended.
enum SessionEnd {
    Failed(SessionError),
    Switch(DesiredSet),
    Restart,
    Shutdown,
}

/// How a backoff wait ended.
enum BackoffEnd {
    Elapsed,
    Switch(DesiredSet),
    Restart,
    Shutdown,
}

/// Reconnection supervisor for one market transport.
pub struct Supervisor<T> {
    transport: T,
    watch_list: Arc<dyn WatchListPort>,
    config: SupervisorConfig,
    policy: ReconnectPolicy,
    router: EventRouter,
    status: Arc<SupervisorStatus>,
    requests: mpsc::Receiver<SupervisorRequest>,
    events: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl<T: MarketTransport> Supervisor<T> {
    /// Create a supervisor and the handle used to drive it.
    #[must_use]
    pub fn new(
        transport: T,
        watch_list: Arc<dyn WatchListPort>,
        config: SupervisorConfig,
        events: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> (Self, SupervisorHandle) {
        let (request_tx, request_rx) = mpsc::channel(config.request_capacity.max(1));
        let status = Arc::new(SupervisorStatus::default());
        let handle = SupervisorHandle {
            requests: request_tx,
            status: Arc::clone(&status),
        };
        let supervisor = Self {
            transport,
            watch_list,
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            config,
            router: EventRouter::new(),
            status,
            requests: request_rx,
            events,
            cancel,
        };
        (supervisor, handle)
    }

    /// Run until cancelled.
    ///
    /// Starts idle; the first `activate`, `resubscribe` or `restart`
    /// request begins ingestion.
    pub async fn run(mut self) {
        tracing::info!("Supervisor started, waiting for a subscription set");
        let mut pending: Option<DesiredSet> = None;

        loop {
            let desired = match pending.take() {
                Some(desired) => desired,
                None => match self.wait_idle().await {
                    Some(desired) => desired,
                    None => break,
                },
            };

            match self.run_cycle(desired).await {
                CycleExit::Idle => {}
                CycleExit::Next(next) => pending = Some(next),
                CycleExit::Shutdown => break,
            }
        }

        if self.status.state().is_active() {
            self.teardown().await;
        }
        self.transport.close().await;
        tracing::info!("Supervisor stopped");
    }

    /// Wait for a request that gives a non-empty set to run.
    async fn wait_idle(&mut self) -> Option<DesiredSet> {
        loop {
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                Some(request) = self.requests.recv() => request,
            };

            match request {
                SupervisorRequest::Activate(desired) | SupervisorRequest::Resubscribe(desired) => {
                    if desired.is_empty() {
                        tracing::debug!("Ignoring request with empty subscription set");
                        continue;
                    }
                    return Some(desired);
                }
                SupervisorRequest::Restart => match self.restart().await {
                    CycleExit::Next(desired) => return Some(desired),
                    CycleExit::Idle => {}
                    CycleExit::Shutdown => return None,
                },
            }
        }
    }

    /// Run sessions for `desired` until switched away, exhausted or cancelled.
    async fn run_cycle(&mut self, mut desired: DesiredSet) -> CycleExit {
        self.policy.reset();
        self.sync_retry_count();
        self.status.exhausted.store(false, Ordering::SeqCst);

        loop {
            self.router.set_catalog(desired.markets().clone());

            let error = match self.run_session(&desired).await {
                SessionEnd::Failed(error) => error,
                SessionEnd::Switch(next) => {
                    tracing::info!(instruments = next.len(), "Replacing live subscription");
                    self.teardown().await;
                    return CycleExit::Next(next);
                }
                SessionEnd::Restart => {
                    self.teardown().await;
                    return self.restart().await;
                }
                SessionEnd::Shutdown => return CycleExit::Shutdown,
            };

            tracing::warn!(error = %error, "Market channel session failed");
            *self.status.last_error.write() = Some(error.to_string());
            self.teardown().await;

            match self.policy.record_failure() {
                RetryDecision::GiveUp { attempts } => {
                    self.sync_retry_count();
                    tracing::error!(
                        attempts,
                        max_attempts = self.policy.max_attempts(),
                        "Maximum reconnection attempts reached, ingestion idle"
                    );
                    self.status.exhausted.store(true, Ordering::SeqCst);
                    self.emit(FeedEvent::RetriesExhausted { attempts }).await;
                    return CycleExit::Idle;
                }
                RetryDecision::RetryAfter { attempt, delay } => {
                    self.sync_retry_count();
                    tracing::info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to market channel"
                    );
                    metrics::record_reconnect();
                    self.emit(FeedEvent::Reconnecting { attempt, delay }).await;

                    match self.backoff(delay, &mut desired).await {
                        BackoffEnd::Elapsed => {}
                        BackoffEnd::Switch(next) => return CycleExit::Next(next),
                        BackoffEnd::Restart => return self.restart().await,
                        BackoffEnd::Shutdown => return CycleExit::Shutdown,
                    }
                }
            }
        }
    }

    /// One pass through connect, authenticate, subscribe and listen.
    async fn run_session(&mut self, desired: &DesiredSet) -> SessionEnd {
        self.set_state(ConnectionState::Connecting).await;
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return SessionEnd::Shutdown,
            result = self.transport.open() => result,
        };
        if let Err(e) = opened {
            return SessionEnd::Failed(SessionError::Connect(e));
        }

        self.set_state(ConnectionState::Authenticating).await;
        if let Err(e) = self
            .transport
            .authenticate(self.config.credentials.as_ref())
            .await
        {
            return SessionEnd::Failed(SessionError::Auth(e));
        }

        self.set_state(ConnectionState::Subscribing).await;
        let instruments = desired.to_vec();
        if let Err(e) = self.transport.subscribe(&instruments).await {
            return SessionEnd::Failed(SessionError::Subscribe(e));
        }

        *self.status.live.write() = desired.instruments().clone();
        metrics::set_live_subscription_size(desired.len());
        self.policy.reset();
        self.sync_retry_count();
        self.status.exhausted.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Listening).await;
        tracing::info!(instruments = instruments.len(), "Listening on market channel");

        self.listen(desired).await
    }

    /// Listen until the session ends, with a keep-alive task alongside.
    async fn listen(&mut self, desired: &DesiredSet) -> SessionEnd {
        let liveness = Arc::new(LivenessState::new());
        let (keep_alive_tx, mut keep_alive_rx) = mpsc::channel(8);
        let keep_alive_cancel = self.cancel.child_token();
        let manager = KeepAliveManager::new(
            self.config.keep_alive.clone(),
            Arc::clone(&liveness),
            keep_alive_tx,
            keep_alive_cancel.clone(),
        );
        let keep_alive_task = tokio::spawn(manager.run());

        let end = self
            .listen_loop(desired, &liveness, &mut keep_alive_rx)
            .await;

        keep_alive_cancel.cancel();
        if let Err(e) = keep_alive_task.await {
            tracing::debug!(error = %e, "Keep-alive task ended abnormally");
        }
        end
    }

    async fn listen_loop(
        &mut self,
        desired: &DesiredSet,
        liveness: &LivenessState,
        keep_alive_rx: &mut mpsc::Receiver<KeepAliveEvent>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Shutdown,
                Some(request) = self.requests.recv() => {
                    if let Some(end) = Self::on_request_while_listening(request, desired) {
                        return end;
                    }
                }
                Some(event) = keep_alive_rx.recv() => match event {
                    KeepAliveEvent::SendKeepAlive => {
                        if let Err(e) = self.transport.send_keep_alive().await {
                            return SessionEnd::Failed(SessionError::Transport(e));
                        }
                        liveness.mark_keep_alive_sent();
                    }
                    KeepAliveEvent::Timeout => {
                        return SessionEnd::Failed(SessionError::KeepAliveTimeout(
                            self.config.keep_alive.timeout,
                        ));
                    }
                },
                received = self.transport.receive() => {
                    metrics::record_frame_received();
                    match received {
                        Ok(Frame::Control(ControlToken::Ping)) => {
                            liveness.record_frame();
                            if let Err(e) = self.transport.send_pong().await {
                                return SessionEnd::Failed(SessionError::Transport(e));
                            }
                        }
                        Ok(Frame::Control(ControlToken::Pong)) => liveness.record_frame(),
                        Ok(Frame::Payload(payload)) => {
                            liveness.record_frame();
                            if let Some(end) = self.on_payload(payload).await {
                                return end;
                            }
                        }
                        Err(e) if e.is_frame_local() => {
                            liveness.record_frame();
                            metrics::record_decode_error();
                            tracing::warn!(error = %e, "Skipping undecodable frame");
                        }
                        Err(e) => return SessionEnd::Failed(SessionError::Transport(e)),
                    }
                }
            }
        }
    }

    fn on_request_while_listening(
        request: SupervisorRequest,
        desired: &DesiredSet,
    ) -> Option<SessionEnd> {
        match request {
            SupervisorRequest::Activate(next) | SupervisorRequest::Resubscribe(next)
                if next.is_empty() =>
            {
                tracing::debug!("Ignoring request with empty subscription set");
                None
            }
            SupervisorRequest::Activate(next) if next.same_instruments(desired.instruments()) => {
                tracing::debug!("Already listening on the requested set");
                None
            }
            SupervisorRequest::Activate(next) | SupervisorRequest::Resubscribe(next) => {
                Some(SessionEnd::Switch(next))
            }
            SupervisorRequest::Restart => Some(SessionEnd::Restart),
        }
    }

    /// Route a payload, forward its events and act on control frames.
    async fn on_payload(&mut self, payload: serde_json::Value) -> Option<SessionEnd> {
        let routed = self.router.route(payload, Utc::now());
        for event in routed.events {
            self.emit(FeedEvent::Book(event)).await;
        }

        match routed.control? {
            ControlMessage::Ping => {
                if let Err(e) = self.transport.send_pong().await {
                    return Some(SessionEnd::Failed(SessionError::Transport(e)));
                }
            }
            ControlMessage::SubscriptionError { channel, error } => {
                tracing::error!(channel = ?channel, error = %error, "Venue rejected subscription");
                return Some(SessionEnd::Failed(SessionError::SubscriptionRejected {
                    error,
                }));
            }
            ControlMessage::AuthError { error } => {
                tracing::warn!(error = %error, "Authentication degraded, continuing unauthenticated");
            }
            ControlMessage::AuthSuccess => tracing::info!("Market channel authenticated"),
            ControlMessage::SubscriptionSuccess { channel } => {
                tracing::info!(channel = ?channel, "Subscription confirmed");
            }
            ControlMessage::Pong | ControlMessage::Unrecognized { .. } => {}
        }
        None
    }

    /// Wait out a backoff delay while staying responsive to requests.
    async fn backoff(&mut self, delay: Duration, desired: &mut DesiredSet) -> BackoffEnd {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let request = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return BackoffEnd::Shutdown,
                () = &mut sleep => return BackoffEnd::Elapsed,
                Some(request) = self.requests.recv() => request,
            };

            match request {
                SupervisorRequest::Activate(next) if !next.is_empty() => {
                    tracing::info!(instruments = next.len(), "Adopting set for next attempt");
                    *desired = next;
                }
                SupervisorRequest::Resubscribe(next) if !next.is_empty() => {
                    return BackoffEnd::Switch(next);
                }
                SupervisorRequest::Activate(_) | SupervisorRequest::Resubscribe(_) => {
                    tracing::debug!("Ignoring request with empty subscription set");
                }
                SupervisorRequest::Restart => return BackoffEnd::Restart,
            }
        }
    }

    /// Settle, then recompute the desired set from the watch-list.
    async fn restart(&mut self) -> CycleExit {
        tracing::info!(
            settle_ms = u64::try_from(self.config.restart_settle.as_millis()).unwrap_or(u64::MAX),
            "Restarting market channel ingestion"
        );
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return CycleExit::Shutdown,
            () = tokio::time::sleep(self.config.restart_settle) => {}
        }

        match load_desired_set(self.watch_list.as_ref()).await {
            Ok(desired) if desired.is_empty() => {
                tracing::warn!("Watch-list is empty after restart, ingestion idle");
                CycleExit::Idle
            }
            Ok(desired) => CycleExit::Next(desired),
            Err(e) => {
                tracing::error!(error = %e, "Watch-list unavailable after restart, ingestion idle");
                CycleExit::Idle
            }
        }
    }

    /// `Closing → Disconnected`, releasing the transport and the live set.
    async fn teardown(&mut self) {
        self.set_state(ConnectionState::Closing).await;
        self.transport.close().await;
        self.status.live.write().clear();
        metrics::set_live_subscription_size(0);
        self.set_state(ConnectionState::Disconnected).await;
    }

    async fn set_state(&mut self, state: ConnectionState) {
        *self.status.state.write() = state;
        metrics::set_connection_state(state);
        tracing::debug!(state = %state, "Connection state changed");
        self.emit(FeedEvent::StateChanged(state)).await;
    }

    fn sync_retry_count(&self) {
        self.status
            .retry_count
            .store(self.policy.failures(), Ordering::SeqCst);
    }

    async fn emit(&mut self, event: FeedEvent) {
        if self.events.send(event).await.is_err() {
            tracing::trace!("Feed event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_handling_while_listening() {
        let live = DesiredSet::from_ids(["A", "B"]);

        let same = SupervisorRequest::Activate(DesiredSet::from_ids(["B", "A"]));
        assert!(Supervisor::<NeverTransport>::on_request_while_listening(same, &live).is_none());

        let empty = SupervisorRequest::Resubscribe(DesiredSet::default());
        assert!(Supervisor::<NeverTransport>::on_request_while_listening(empty, &live).is_none());

        let different = SupervisorRequest::Activate(DesiredSet::from_ids(["A", "C"]));
        assert!(matches!(
            Supervisor::<NeverTransport>::on_request_while_listening(different, &live),
            Some(SessionEnd::Switch(_))
        ));

        let resubscribe = SupervisorRequest::Resubscribe(DesiredSet::from_ids(["A", "B"]));
        assert!(matches!(
            Supervisor::<NeverTransport>::on_request_while_listening(resubscribe, &live),
            Some(SessionEnd::Switch(_))
        ));

        assert!(matches!(
            Supervisor::<NeverTransport>::on_request_while_listening(
                SupervisorRequest::Restart,
                &live
            ),
            Some(SessionEnd::Restart)
        ));
    }

    #[tokio::test]
    async fn handle_reports_stopped_supervisor() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SupervisorHandle {
            requests: tx,
            status: Arc::new(SupervisorStatus::default()),
        };
        assert_eq!(
            handle.restart().await,
            Err(ControlError::SupervisorStopped)
        );
        assert!(handle.live_subscription().is_empty());
    }

    struct NeverTransport;

    #[async_trait]
    impl MarketTransport for NeverTransport {
        async fn open(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn authenticate(
            &mut self,
            _credentials: Option<&Credentials>,
        ) -> Result<(), TransportError> {
            Ok(())
        }
        async fn subscribe(&mut self, _instruments: &[InstrumentId]) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_keep_alive(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_pong(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn receive(&mut self) -> Result<Frame, TransportError> {
            std::future::pending().await
        }
        async fn close(&mut self) {}
    }
}
