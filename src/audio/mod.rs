//! Audio capture
//!
//! Owns the microphone for one recording session: frames raw audio into
//! fixed-size blocks, gates near-silence blocks, and concatenates accepted
//! blocks into one buffer when the session stops.

mod capture;
mod resample;

pub use capture::{
    AudioSession, BLOCK_SIZE, MicSource, SAMPLE_RATE, SILENCE_THRESHOLD, is_silence,
    peak_amplitude, samples_to_wav,
};
pub use resample::resample;

use crate::Result;

/// Source of recorded audio, the seam between the coordinator and the
/// microphone. The production implementation is [`MicSource`]; tests drive
/// the pipeline with scripted buffers.
pub trait CaptureSource {
    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns error if the device is unavailable or refuses the stream
    fn start(&mut self) -> Result<()>;

    /// Stop recording and return the accepted samples, concatenated in
    /// arrival order at 16 kHz. Returns an empty buffer when nothing was
    /// accepted, and is a no-op when not recording.
    fn stop(&mut self) -> Vec<f32>;

    /// Whether a recording session is active
    fn is_active(&self) -> bool;
}
