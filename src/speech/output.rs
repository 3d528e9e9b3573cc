//! The voice-output seam held by the pipeline coordinator

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

use super::{AudioPlayback, Synthesizer};

/// Bounded wait `prepare` spends on pending voice discovery
const PREPARE_WAIT: Duration = Duration::from_secs(2);

/// Speech output contract: warm up, speak, stop.
///
/// The production implementation is [`DeviceVoice`]; tests substitute a
/// scripted one. Futures are not required to be `Send` because the device
/// implementation holds cpal streams across awaits.
#[async_trait(?Send)]
pub trait VoiceOutput {
    /// Whether voice discovery has completed
    fn is_ready(&self) -> bool;

    /// Resolve once ready, or after a short bounded wait if discovery is
    /// still pending. Lets the coordinator overlap engine warm-up with the
    /// network request.
    async fn prepare(&self);

    /// Cancel any current utterance and play this one, resolving when
    /// playback completes
    ///
    /// # Errors
    ///
    /// Returns `Error::Speech` if the engine is not ready or playback fails
    async fn speak(&self, text: &str, rate: f32, volume: f32) -> Result<()>;

    /// Best-effort cancellation; safe when nothing is playing
    fn stop(&self);
}

/// Remote synthesis + local device playback
pub struct DeviceVoice {
    synth: Synthesizer,
    playback: AudioPlayback,
}

impl DeviceVoice {
    /// Combine a synthesizer and a playback device
    #[must_use]
    pub const fn new(synth: Synthesizer, playback: AudioPlayback) -> Self {
        Self { synth, playback }
    }
}

#[async_trait(?Send)]
impl VoiceOutput for DeviceVoice {
    fn is_ready(&self) -> bool {
        self.synth.is_ready()
    }

    async fn prepare(&self) {
        if self.synth.is_ready() {
            return;
        }

        match tokio::time::timeout(PREPARE_WAIT, self.synth.discover()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "voice discovery failed"),
            Err(_) => tracing::debug!("voice discovery still pending after bounded wait"),
        }
    }

    async fn speak(&self, text: &str, rate: f32, volume: f32) -> Result<()> {
        let audio = self.synth.synthesize(text, rate).await?;
        self.playback.play_mp3(&audio, volume).await
    }

    fn stop(&self) {
        self.playback.stop();
    }
}
