//! Talkback - push-to-talk voice interaction pipeline
//!
//! One interaction cycle flows strictly one way:
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Capture  │──▶│ Transcription   │──▶│ Completion  │──▶│ Speech   │
//! │ (cpal)   │   │ worker (task)   │   │ API (http)  │   │ output   │
//! └──────────┘   └─────────────────┘   └─────────────┘   └──────────┘
//!        ▲                                                     │
//!        └──────────────── Pipeline coordinator ◀──────────────┘
//! ```
//!
//! The coordinator is the only component aware of all stages; capture,
//! worker, request layer and voice output are mutually unaware. An `axum`
//! server additionally exposes the completion layer over HTTP behind
//! per-client rate limiting.

pub mod api;
pub mod audio;
pub mod completion;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod speech;
pub mod transcribe;

pub use api::{ApiServer, ApiState, RateWindowLimiter};
pub use audio::{AudioSession, CaptureSource, MicSource, SAMPLE_RATE};
pub use completion::{CompletionClient, ResponseCache, RetryPolicy};
pub use config::{Config, VoiceSettings};
pub use error::{Error, Result};
pub use pipeline::{CycleOutcome, LatencyHistory, LatencyReport, Pipeline, PipelineState};
pub use speech::{AudioPlayback, DeviceVoice, Synthesizer, VoiceOutput};
pub use transcribe::{HttpSttEngine, SpeechEngine, WorkerHandle, WorkerStatus};
