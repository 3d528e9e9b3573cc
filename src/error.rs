//! Error types for the talkback pipeline

use thiserror::Error;

/// Result type alias for talkback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the talkback pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone unavailable or permission denied
    #[error("audio device error: {0}")]
    Device(String),

    /// Transcription capability failed to initialize
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Recording produced no signal above the silence gate
    #[error("no audio captured: {0}")]
    EmptyAudio(String),

    /// Internal transcription fault
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Completion request exceeded its deadline
    #[error("completion request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Completion API returned a non-success status
    #[error("upstream error {status}: {message}")]
    Upstream {
        /// HTTP status code from the completion API
        status: u16,
        /// Upstream-provided message, if any
        message: String,
    },

    /// Request rejected by the rate limiter
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Speech synthesis or playback fault
    #[error("speech error: {0}")]
    Speech(String),

    /// Pipeline entry-point misuse (cycle already active, system not ready)
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the failure is worth retrying by the pipeline coordinator.
    ///
    /// Timeouts and upstream server faults are transient; rate limiting and
    /// configuration problems are not, and quota-class upstream rejections
    /// would only burn more quota.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Http(_) => true,
            Self::Upstream { status, message } => {
                let lower = message.to_lowercase();
                !(matches!(status, 401 | 403)
                    || lower.contains("quota")
                    || lower.contains("billing")
                    || lower.contains("api key"))
            }
            _ => false,
        }
    }
}
