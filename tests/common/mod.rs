//! Shared test utilities: mock upstream HTTP servers
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use secrecy::SecretString;

use talkback::config::CompletionConfig;

/// Bind a router on an ephemeral port and serve it for the test's lifetime
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

/// Completion-API response body carrying one candidate
pub fn candidate_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}

/// How the mock completion upstream behaves
pub enum UpstreamBehavior {
    /// Always reply with this text
    Reply(String),
    /// Fail with 503 this many times, then reply
    FailThenReply { failures: usize, reply: String },
    /// Always return this status and raw body
    Status(u16, String),
    /// Sleep before replying
    Delay(Duration, String),
    /// Reply 200 with an empty body (no candidates)
    NoCandidates,
}

/// A mock completion upstream with a request counter
pub struct MockUpstream {
    /// Base URL to point the client at
    pub base_url: String,
    /// Requests seen
    pub hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Spawn a completion upstream; any path hits the scripted behavior
pub async fn spawn_upstream(behavior: UpstreamBehavior) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = Arc::new((behavior, Arc::clone(&hits)));

    let router = Router::new().fallback(move || {
        let state = Arc::clone(&state);
        async move {
            let (behavior, hits) = &*state;
            let n = hits.fetch_add(1, Ordering::SeqCst);

            match behavior {
                UpstreamBehavior::Reply(text) => {
                    (StatusCode::OK, axum::Json(candidate_body(text))).into_response()
                }
                UpstreamBehavior::FailThenReply { failures, reply } => {
                    if n < *failures {
                        (
                            StatusCode::SERVICE_UNAVAILABLE,
                            axum::Json(serde_json::json!({
                                "error": { "message": "temporarily overloaded" }
                            })),
                        )
                            .into_response()
                    } else {
                        (StatusCode::OK, axum::Json(candidate_body(reply))).into_response()
                    }
                }
                UpstreamBehavior::Status(code, body) => (
                    StatusCode::from_u16(*code).unwrap(),
                    body.clone(),
                )
                    .into_response(),
                UpstreamBehavior::Delay(delay, reply) => {
                    tokio::time::sleep(*delay).await;
                    (StatusCode::OK, axum::Json(candidate_body(reply))).into_response()
                }
                UpstreamBehavior::NoCandidates => {
                    (StatusCode::OK, axum::Json(serde_json::json!({}))).into_response()
                }
            }
        }
    });

    let base_url = spawn_server(router).await;
    MockUpstream { base_url, hits }
}

/// Completion config pointed at a mock upstream, with a test credential
pub fn completion_config(base_url: &str) -> CompletionConfig {
    CompletionConfig {
        base_url: base_url.to_string(),
        api_key: Some(SecretString::from("test-api-key")),
        ..CompletionConfig::default()
    }
}
