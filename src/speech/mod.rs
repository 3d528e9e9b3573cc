//! Speech output
//!
//! Wraps synthesis and playback behind an awaitable contract: the caller
//! awaits completion or failure of an utterance, and can warm the engine
//! up concurrently with the network request to hide its startup latency.

mod output;
mod playback;
mod synth;

pub use output::{DeviceVoice, VoiceOutput};
pub use playback::AudioPlayback;
pub use synth::{Synthesizer, Voice, select_voice};
