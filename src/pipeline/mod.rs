//! Pipeline coordinator
//!
//! Drives one interaction cycle — record, transcribe, complete, speak —
//! through a strict state machine, recording per-stage latencies. The
//! coordinator is the only component aware of all stages; capture, worker,
//! request layer and voice output never see each other.

mod metrics;

pub use metrics::{CycleTimings, LatencyHistory, LatencyReport};

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::audio::CaptureSource;
use crate::completion::{CompletionClient, RetryPolicy, with_retry};
use crate::config::VoiceSettings;
use crate::speech::VoiceOutput;
use crate::transcribe::WorkerHandle;
use crate::{Error, Result};

/// Cycle totals retained for the running average
const HISTORY_DEPTH: usize = 20;

/// Pipeline stage for the cycle in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No cycle active; the only state `start` is accepted in
    Idle,
    /// Microphone open, blocks accumulating
    Recording,
    /// Buffer handed to the transcription worker
    Transcribing,
    /// Completion request in flight (TTS warm-up overlapped)
    Completing,
    /// Utterance playing
    Speaking,
}

/// Result of one completed interaction cycle
#[derive(Debug)]
pub struct CycleOutcome {
    /// What the user said
    pub transcript: String,
    /// The assistant's reply text
    pub reply: String,
    /// Per-stage latencies
    pub latency: LatencyReport,
    /// Playback failure, when the cycle completed without audio output
    pub speech_error: Option<String>,
}

/// The pipeline coordinator
pub struct Pipeline {
    capture: Box<dyn CaptureSource>,
    worker: WorkerHandle,
    voice: Box<dyn VoiceOutput>,
    completion: Arc<CompletionClient>,
    settings: VoiceSettings,
    state: PipelineState,
    history: LatencyHistory,
    completion_failures: u32,
}

impl Pipeline {
    /// Assemble a pipeline from its four stages
    #[must_use]
    pub fn new(
        capture: Box<dyn CaptureSource>,
        worker: WorkerHandle,
        voice: Box<dyn VoiceOutput>,
        completion: Arc<CompletionClient>,
        settings: VoiceSettings,
    ) -> Self {
        Self {
            capture,
            worker,
            voice,
            completion,
            settings,
            state: PipelineState::Idle,
            history: LatencyHistory::new(HISTORY_DEPTH),
            completion_failures: 0,
        }
    }

    /// Current pipeline state
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Current voice settings
    #[must_use]
    pub const fn settings(&self) -> VoiceSettings {
        self.settings
    }

    /// Replace the voice settings (presentation-layer controls)
    pub const fn set_settings(&mut self, settings: VoiceSettings) {
        self.settings = settings;
    }

    /// Trailing cycle-latency history
    #[must_use]
    pub const fn history(&self) -> &LatencyHistory {
        &self.history
    }

    /// Completion failures across the pipeline's lifetime
    #[must_use]
    pub const fn completion_failures(&self) -> u32 {
        self.completion_failures
    }

    /// Composite ready gate: transcription engine loaded and voice output
    /// discovered
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.worker.is_ready() && self.voice.is_ready()
    }

    /// Begin a recording cycle.
    ///
    /// # Errors
    ///
    /// Refused with `Error::Pipeline` when a cycle is already active or the
    /// ready gate is closed; `Error::Device` if the microphone cannot open
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Err(Error::Pipeline(format!(
                "a cycle is already active ({:?})",
                self.state
            )));
        }
        if !self.is_ready() {
            return Err(Error::Pipeline("system not ready".to_string()));
        }

        self.capture.start()?;
        self.state = PipelineState::Recording;
        tracing::debug!("recording started");
        Ok(())
    }

    /// Stop recording and run the cycle to completion.
    ///
    /// Speech playback failure does not abort the cycle — the transcript
    /// and reply are still returned, with the failure noted in the outcome.
    ///
    /// # Errors
    ///
    /// `Error::Pipeline` when no recording is active; `Error::EmptyAudio`
    /// when nothing cleared the silence gate; transcription and completion
    /// failures propagate after the cycle latency is recorded
    #[allow(clippy::future_not_send)]
    pub async fn stop(&mut self) -> Result<CycleOutcome> {
        if self.state != PipelineState::Recording {
            return Err(Error::Pipeline("no recording in progress".to_string()));
        }

        let cycle = Uuid::new_v4();
        let samples = self.capture.stop();
        let mut timings = CycleTimings::new();

        if samples.is_empty() {
            // Never invoke the worker for an empty buffer
            return Err(self.fail(
                &timings,
                Error::EmptyAudio("no audio captured, try speaking louder".to_string()),
            ));
        }

        self.state = PipelineState::Transcribing;
        tracing::debug!(%cycle, samples = samples.len(), "transcribing");

        let transcript = match self.worker.transcribe(samples).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(&timings, e)),
        };
        timings.mark_transcribed();

        if transcript.is_empty() {
            return Err(self.fail(
                &timings,
                Error::Transcription("nothing intelligible captured".to_string()),
            ));
        }

        self.state = PipelineState::Completing;
        tracing::info!(%cycle, transcript = %transcript, "completing");

        // Warm the speech engine while the completion request is in flight
        let policy = RetryPolicy {
            max_retries: self.settings.max_retries,
            base_delay: Duration::from_millis(1000),
        };
        let settings = self.settings;
        let completion = Arc::clone(&self.completion);
        let (reply, ()) = futures::future::join(
            with_retry(&policy, || completion.complete(&transcript, settings)),
            self.voice.prepare(),
        )
        .await;

        let reply = match reply {
            Ok(text) => text,
            Err(e) => {
                self.completion_failures += 1;
                return Err(self.fail(&timings, e));
            }
        };
        timings.mark_completed();

        self.state = PipelineState::Speaking;
        tracing::info!(%cycle, reply = %reply, "speaking");

        let speech_error = match self
            .voice
            .speak(&reply, settings.speech_rate, settings.speech_volume)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                // Non-fatal: the reply text still reaches the user
                tracing::warn!(%cycle, error = %e, "speech output failed");
                Some(e.to_string())
            }
        };
        timings.mark_finished();

        self.state = PipelineState::Idle;
        let latency = timings.report();
        self.history.push(latency.total);

        tracing::info!(
            %cycle,
            total_ms = latency.total.as_millis(),
            transcript_ms = latency.capture_to_transcript.as_millis(),
            completion_ms = latency.transcript_to_completion.as_millis(),
            speech_ms = latency.completion_to_speech.as_millis(),
            "cycle complete"
        );

        Ok(CycleOutcome {
            transcript,
            reply,
            latency,
            speech_error,
        })
    }

    /// Best-effort halt of any current speech output
    pub fn stop_speaking(&self) {
        self.voice.stop();
    }

    /// Short-circuit the cycle: record the partial latency, return to idle
    fn fail(&mut self, timings: &CycleTimings, error: Error) -> Error {
        self.state = PipelineState::Idle;
        self.history.push(timings.elapsed());
        tracing::warn!(error = %error, "cycle failed");
        error
    }
}
