//! Transcription worker boundary
//!
//! The transcription capability loads once, inside a dedicated task, so a
//! slow model load never blocks the interactive loop. Callers talk to the
//! task purely by message passing and get exactly one reply per request.

mod engine;
mod worker;

pub use engine::{HttpSttEngine, SpeechEngine};
pub use worker::{WorkerHandle, WorkerStatus, spawn};
