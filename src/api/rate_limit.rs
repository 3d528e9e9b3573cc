//! Per-client fixed-window rate limiting
//!
//! The server is the single authoritative enforcement point: requests over
//! the ceiling are rejected here and never reach the upstream API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::ApiState;

/// One client's request window
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window request limiter keyed by client address
#[derive(Debug)]
pub struct RateWindowLimiter {
    max: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateWindowLimiter {
    /// Limiter allowing `max` requests per `window` per client
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `client`. Returns true if it is allowed.
    ///
    /// An elapsed window resets the counter to 1; within a window the count
    /// increments until the ceiling is reached.
    pub fn check(&self, client: &str) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();

        match windows.get_mut(client) {
            Some(window) if now.duration_since(window.started) <= self.window => {
                if window.count >= self.max {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    client.to_string(),
                    Window {
                        count: 1,
                        started: now,
                    },
                );
                true
            }
        }
    }
}

/// Identify the caller: first hop of `x-forwarded-for`, else peer address
fn client_address(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

/// Rate limiting middleware for the chat endpoint
pub async fn rate_limit_middleware(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_address(&req);

    if !state.limiter.check(&client) {
        tracing::warn!(client = %client, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({
                "error": "Too many requests. Please slow down."
            })),
        )
            .into_response();
    }

    next.run(req).await
}
