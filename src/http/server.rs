//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the agent endpoints
//! - Wire up middleware (tracing, request metrics)
//! - Serve until shutdown is requested, then drain gracefully

use async_trait::async_trait;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::agent::{LocalAgent, Subsystem, SubsystemError};
use crate::http::handlers::*;
use crate::http::middleware::request_metrics_middleware;
use crate::observability::Telemetry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<LocalAgent>,
    pub telemetry: Telemetry,
}

/// How long in-flight connections may take to finish after a stop.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The running HTTP API.
pub struct HttpServer {
    local_addr: SocketAddr,
    drain_timeout: Duration,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl HttpServer {
    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/v1/agent/self", get(get_self))
            .route("/v1/agent/members", get(get_members))
            .route("/v1/agent/services", get(get_services))
            .route("/v1/agent/checks", get(get_checks))
            .route("/v1/agent/metrics", get(get_metrics))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                request_metrics_middleware,
            ))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and start serving.
    pub async fn start(
        addr: &str,
        agent: Arc<LocalAgent>,
        telemetry: Telemetry,
    ) -> Result<Self, SubsystemError> {
        let bind_err = |source| SubsystemError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let app = Self::build_router(AppState { agent, telemetry });
        let (stop, stopped) = oneshot::channel::<()>();

        tracing::info!(address = %local_addr, "HTTP server starting");
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await
        });

        Ok(Self {
            local_addr,
            drain_timeout: DRAIN_TIMEOUT,
            stop: Mutex::new(Some(stop)),
            task: Mutex::new(Some(task)),
        })
    }

    /// Override the drain deadline applied on shutdown.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    match slot.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

#[async_trait]
impl Subsystem for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn shutdown(&self) -> Result<(), SubsystemError> {
        if let Some(stop) = take(&self.stop) {
            let _ = stop.send(());
        }
        let Some(mut task) = take(&self.task) else {
            return Ok(());
        };

        let joined = match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                tracing::warn!(address = %self.local_addr, "HTTP connections still open after drain deadline");
                return Err(SubsystemError::Failed("http drain timed out".into()));
            }
        };

        match joined {
            Ok(Ok(())) => {
                tracing::info!(address = %self.local_addr, "HTTP server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SubsystemError::Failed(format!("http server: {}", e))),
            Err(e) => Err(SubsystemError::Failed(format!("http server task: {}", e))),
        }
    }
}
