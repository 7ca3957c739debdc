//! Keep-alive Manager
//!
//! Drives the plain-text `PING` cadence while a session is listening and
//! declares the session dead when nothing at all arrives for too long
//! after a keep-alive was sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for keep-alive behavior.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between `PING` tokens.
    pub interval: Duration,
    /// Silence tolerated after a `PING` before the session is failed.
    pub timeout: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

impl KeepAliveConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Events emitted by the keep-alive manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveEvent {
    /// Send a `PING` token now.
    SendKeepAlive,
    /// No frame arrived within the timeout; the session should fail.
    Timeout,
}

/// Liveness state shared between the keep-alive manager and the session loop.
#[derive(Debug)]
pub struct LivenessState {
    last_frame: RwLock<Instant>,
    awaiting_reply: AtomicBool,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Create new liveness state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_frame: RwLock::new(Instant::now()),
            awaiting_reply: AtomicBool::new(false),
        }
    }

    /// Record that a frame of any kind arrived.
    pub fn record_frame(&self) {
        *self.last_frame.write() = Instant::now();
        self.awaiting_reply.store(false, Ordering::SeqCst);
    }

    /// Mark that a `PING` went out.
    pub fn mark_keep_alive_sent(&self) {
        self.awaiting_reply.store(true, Ordering::SeqCst);
    }

    /// Whether a `PING` is outstanding.
    #[must_use]
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply.load(Ordering::SeqCst)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_frame.read().elapsed()
    }
}

/// Keep-alive manager for one listening session.
///
/// The first tick fires immediately; every tick either reports a timeout
/// or asks the session loop to send a `PING`.
pub struct KeepAliveManager {
    config: KeepAliveConfig,
    state: Arc<LivenessState>,
    event_tx: mpsc::Sender<KeepAliveEvent>,
    cancel: CancellationToken,
}

impl KeepAliveManager {
    /// Create a new keep-alive manager.
    #[must_use]
    pub const fn new(
        config: KeepAliveConfig,
        state: Arc<LivenessState>,
        event_tx: mpsc::Sender<KeepAliveEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, a timeout is detected, or the session loop goes away.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Keep-alive manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_request().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn check_and_request(&self) -> Result<(), ()> {
        if self.state.is_awaiting_reply() {
            let silence = self.state.silence();
            if silence > self.config.timeout {
                tracing::warn!(
                    silence_secs = silence.as_secs(),
                    timeout_secs = self.config.timeout.as_secs(),
                    "Keep-alive timeout detected"
                );
                let _ = self.event_tx.send(KeepAliveEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(KeepAliveEvent::SendKeepAlive).await.is_err() {
            tracing::debug!("Session loop gone, stopping keep-alive");
            return Err(());
        }
        Ok(())
    }
}
