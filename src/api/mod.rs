//! HTTP API server
//!
//! Server side of the completion request layer: the chat endpoint behind
//! per-client rate limiting, plus a health check.

pub mod chat;
pub mod health;
pub mod rate_limit;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::completion::CompletionClient;
use crate::config::{Config, VoiceSettings};
use crate::{Error, Result};

pub use rate_limit::RateWindowLimiter;

/// Shared state for API handlers
pub struct ApiState {
    /// The completion request layer
    pub completion: Arc<CompletionClient>,
    /// Server-side voice settings defaults (caching, retries)
    pub defaults: VoiceSettings,
    /// Per-client request limiter
    pub limiter: RateWindowLimiter,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build a server from configuration and a completion client
    #[must_use]
    pub fn new(config: &Config, completion: Arc<CompletionClient>) -> Self {
        let state = Arc::new(ApiState {
            completion,
            defaults: config.settings,
            limiter: RateWindowLimiter::new(
                config.server.rate_limit_max,
                config.server.rate_limit_window,
            ),
        });

        Self {
            state,
            port: config.server.port,
        }
    }

    /// Assemble the router; public so tests can drive it without binding
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    /// Run the API server until the process exits
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// Assemble the full router: rate-limited chat API plus health
pub fn build_router(state: Arc<ApiState>) -> Router {
    let api = chat::router(Arc::clone(&state)).layer(axum::middleware::from_fn_with_state(
        state,
        rate_limit::rate_limit_middleware,
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api)
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
