//! HTTP host that receives push deliveries and drives a [`Notifier`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, warn};

use super::pubsub::PushRequest;
use crate::context::RequestContext;
use crate::notification::{HandleOutcome, Notifier};
use crate::{Error, Result};

/// Host server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Request body size limit in bytes
    pub body_limit: usize,
    /// Upper bound on handling one event, delivery included
    pub delivery_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 1024 * 1024,
            delivery_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))
    }
}

#[derive(Clone)]
struct HostState {
    notifier: Arc<dyn Notifier>,
    delivery_timeout: Duration,
    shutdown: CancellationToken,
}

/// Serves push deliveries for one notifier.
pub struct NotifierServer {
    config: ServerConfig,
    notifier: Arc<dyn Notifier>,
    cancel_token: CancellationToken,
}

impl NotifierServer {
    pub fn new(config: ServerConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            notifier,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    ///
    /// Cancelling it also aborts deliveries still in flight.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn router(&self) -> Router {
        let state = HostState {
            notifier: self.notifier.clone(),
            delivery_timeout: self.config.delivery_timeout,
            shutdown: self.cancel_token.clone(),
        };

        Router::new()
            .route("/", post(receive_push))
            .route("/healthz", get(healthz))
            .layer(DefaultBodyLimit::max(self.config.body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        if req.uri().path() == "/healthz" {
                            Span::none()
                        } else {
                            tracing::info_span!("push", method = %req.method(), path = %req.uri().path())
                        }
                    }),
            )
            .with_state(state)
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(notifier = self.notifier.notifier_type(), "listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("notifier server shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn receive_push(State(state): State<HostState>, body: Bytes) -> (StatusCode, String) {
    let build = match PushRequest::from_slice(&body).and_then(|req| {
        let build = req.decode_build()?;
        Ok((req.message.message_id, build))
    }) {
        Ok((message_id, build)) => {
            info!(message_id = %message_id, build_id = %build.id, "received build event");
            build
        }
        Err(e) => {
            warn!(error = %e, "rejecting push request");
            return (StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let ctx = RequestContext::with_cancellation(state.shutdown.child_token())
        .with_timeout(state.delivery_timeout);

    match state.notifier.send_notification(&ctx, &build).await {
        Ok(HandleOutcome::Filtered) => (StatusCode::OK, "filtered".to_string()),
        Ok(HandleOutcome::Delivered { status }) => {
            (StatusCode::OK, format!("delivered ({})", status.as_u16()))
        }
        Err(e) => {
            error!(
                build_id = %build.id,
                stage = e.stage(),
                error = %e,
                "failed to handle build event"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.delivery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn socket_addr_rejects_garbage() {
        let config = ServerConfig {
            bind_address: "not an address".into(),
            ..Default::default()
        };
        assert!(matches!(config.socket_addr(), Err(Error::Configuration(_))));
    }
}
