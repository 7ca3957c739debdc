//! Health Check, Metrics and Operator Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, Prometheus
//! metrics, operator commands and a live notification stream.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (ready while listening)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `POST /commands` - Enqueue an operator command (`{"command": "restart"}` or `restart`)
//! - `GET /notifications` - Server-sent events of published notifications (`?topic=` filters)

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::ConnectionState;
use crate::infrastructure::broadcast::SharedNotificationHub;
use crate::infrastructure::commands::{CommandSender, EnqueueError};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::polymarket::SupervisorStatus;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Market channel session status.
    pub feed: FeedInfo,
    /// Live subscription statistics.
    pub subscription: SubscriptionInfo,
    /// Notification listeners.
    pub notification_listeners: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Listening on the market channel.
    Healthy,
    /// Connecting, reconnecting or waiting for a subscription set.
    Degraded,
    /// Retries exhausted; ingestion idle until restart or reconciliation.
    Unhealthy,
}

/// Market channel session status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Connection state.
    pub state: ConnectionState,
    /// Whether market data is flowing.
    pub listening: bool,
    /// Consecutive failures since the last successful session.
    pub retry_count: u32,
    /// Whether the retry budget is spent.
    pub retries_exhausted: bool,
    /// Most recent session failure.
    pub last_error: Option<String>,
}

/// Live subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// Instruments in the live subscription.
    pub instruments: usize,
}

/// Response to an accepted command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAccepted {
    /// Correlation id.
    pub id: String,
    /// Command name.
    pub command: String,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: Arc<SupervisorStatus>,
    notifications: SharedNotificationHub,
    commands: CommandSender,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        status: Arc<SupervisorStatus>,
        notifications: SharedNotificationHub,
        commands: CommandSender,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
            notifications,
            commands,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the HTTP routes.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/commands", post(command_handler))
        .route("/notifications", get(notifications_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.status.state().is_listening() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn command_handler(State(state): State<Arc<HealthServerState>>, body: String) -> Response {
    match state.commands.enqueue_body(&body) {
        Ok(envelope) => {
            tracing::info!(command = %envelope.command, command_id = %envelope.id, "Command enqueued");
            (
                StatusCode::ACCEPTED,
                Json(CommandAccepted {
                    id: envelope.id,
                    command: envelope.command,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Command rejected");
            let code = match e {
                EnqueueError::InvalidBody => StatusCode::BAD_REQUEST,
                EnqueueError::Full | EnqueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            };
            (code, e.to_string()).into_response()
        }
    }
}

/// Query for `GET /notifications`.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    /// Only stream this topic.
    pub topic: Option<String>,
}

async fn notifications_handler(
    State(state): State<Arc<HealthServerState>>,
    Query(query): Query<NotificationQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = query.topic;
    let stream = BroadcastStream::new(state.notifications.subscribe()).filter_map(move |item| {
        // Lagged receivers skip what they missed.
        let notification = item.ok()?;
        if topic.as_ref().is_some_and(|t| *t != notification.topic) {
            return None;
        }
        Event::default()
            .event(notification.topic.clone())
            .json_data(&notification)
            .ok()
            .map(Ok::<_, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.status.state();
    let exhausted = state.status.is_exhausted();

    HealthResponse {
        status: determine_health_status(connection, exhausted),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed: FeedInfo {
            state: connection,
            listening: connection.is_listening(),
            retry_count: state.status.retry_count(),
            retries_exhausted: exhausted,
            last_error: state.status.last_error(),
        },
        subscription: SubscriptionInfo {
            instruments: state.status.live_subscription().len(),
        },
        notification_listeners: state.notifications.receiver_count(),
    }
}

const fn determine_health_status(state: ConnectionState, exhausted: bool) -> HealthStatus {
    if state.is_listening() {
        HealthStatus::Healthy
    } else if exhausted {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::CommandSource;
    use crate::infrastructure::broadcast::NotificationHub;
    use crate::infrastructure::commands::{ChannelCommandSource, command_queue};

    fn state() -> (Arc<HealthServerState>, ChannelCommandSource) {
        let (sender, source) = command_queue(4);
        let state = HealthServerState::new(
            "0.1.0".to_string(),
            Arc::new(SupervisorStatus::default()),
            Arc::new(NotificationHub::with_defaults()),
            sender,
        );
        (Arc::new(state), source)
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection() {
        assert_eq!(
            determine_health_status(ConnectionState::Listening, false),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(ConnectionState::Connecting, false),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(ConnectionState::Disconnected, true),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn liveness_and_readiness() {
        let (state, _source) = state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_idle_feed() {
        let (state, _source) = state();
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["feed"]["state"], "disconnected");
        assert_eq!(body["subscription"]["instruments"], 0);
    }

    #[tokio::test]
    async fn commands_are_enqueued() {
        let (state, mut source) = state();
        let response = router(state)
            .oneshot(
                Request::post("/commands")
                    .body(Body::from(r#"{"command":"restart"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let envelope = source.next_command().await.unwrap();
        assert_eq!(envelope.command, "restart");
    }

    #[tokio::test]
    async fn empty_command_body_is_rejected() {
        let (state, _source) = state();
        let response = router(state)
            .oneshot(Request::post("/commands").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
