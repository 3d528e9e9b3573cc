//! Pipeline coordinator integration tests
//!
//! Runs full cycles with a scripted capture source, a stub transcription
//! engine, and a mock voice output; the completion layer runs for real
//! against a loopback upstream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use talkback::audio::CaptureSource;
use talkback::config::VoiceSettings;
use talkback::pipeline::{Pipeline, PipelineState};
use talkback::speech::VoiceOutput;
use talkback::transcribe::SpeechEngine;
use talkback::{CompletionClient, Error, Result};

mod common;
use common::{UpstreamBehavior, completion_config, spawn_upstream};

/// Capture source returning a scripted buffer
struct ScriptedCapture {
    buffer: Vec<f32>,
    active: bool,
}

impl ScriptedCapture {
    fn with(buffer: Vec<f32>) -> Self {
        Self {
            buffer,
            active: false,
        }
    }
}

impl CaptureSource for ScriptedCapture {
    fn start(&mut self) -> Result<()> {
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Vec<f32> {
        self.active = false;
        std::mem::take(&mut self.buffer)
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Transcription engine with a fixed transcript and a call counter
struct CountingEngine {
    transcript: String,
    calls: AtomicUsize,
}

impl CountingEngine {
    fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: transcript.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpeechEngine for CountingEngine {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcript.clone())
    }
}

/// Shared observable state of the mock voice output
#[derive(Default)]
struct VoiceProbe {
    prepared: AtomicBool,
    utterances: Mutex<Vec<(String, f32, f32)>>,
}

/// Scripted voice output
struct MockVoice {
    probe: Arc<VoiceProbe>,
    ready: bool,
    fail_speak: bool,
}

impl MockVoice {
    fn ready(probe: Arc<VoiceProbe>) -> Self {
        Self {
            probe,
            ready: true,
            fail_speak: false,
        }
    }
}

#[async_trait(?Send)]
impl VoiceOutput for MockVoice {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn prepare(&self) {
        self.probe.prepared.store(true, Ordering::SeqCst);
    }

    async fn speak(&self, text: &str, rate: f32, volume: f32) -> Result<()> {
        if self.fail_speak {
            return Err(Error::Speech("playback failed".to_string()));
        }
        self.probe
            .utterances
            .lock()
            .unwrap()
            .push((text.to_string(), rate, volume));
        Ok(())
    }

    fn stop(&self) {}
}

/// Two seconds of audio comfortably above the silence gate
fn loud_buffer() -> Vec<f32> {
    vec![0.5; 32000]
}

async fn build_pipeline(
    capture: ScriptedCapture,
    engine: Arc<CountingEngine>,
    voice: MockVoice,
    upstream_base: &str,
    settings: VoiceSettings,
) -> Pipeline {
    let worker = talkback::transcribe::spawn(engine as Arc<dyn SpeechEngine>);
    worker.init().await.unwrap();

    let completion = Arc::new(CompletionClient::new(&completion_config(upstream_base)).unwrap());

    Pipeline::new(
        Box::new(capture),
        worker,
        Box::new(voice),
        completion,
        settings,
    )
}

#[tokio::test]
async fn end_to_end_cycle() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("Hi! How can I help?".into())).await;
    let probe = Arc::new(VoiceProbe::default());
    let engine = CountingEngine::new("hello there");

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        Arc::clone(&engine),
        MockVoice::ready(Arc::clone(&probe)),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    assert!(pipeline.is_ready());
    pipeline.start().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Recording);

    let outcome = pipeline.stop().await.unwrap();

    assert_eq!(outcome.transcript, "hello there");
    assert_eq!(outcome.reply, "Hi! How can I help?");
    assert!(outcome.speech_error.is_none());
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.history().len(), 1);
    assert!(pipeline.history().average().is_some());

    // The utterance played with the default rate and volume
    let utterances = probe.utterances.lock().unwrap();
    assert_eq!(utterances.len(), 1);
    assert_eq!(utterances[0].0, "Hi! How can I help?");
}

#[tokio::test]
async fn empty_buffer_never_reaches_the_worker() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("unused".into())).await;
    let engine = CountingEngine::new("unused");

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(Vec::new()),
        Arc::clone(&engine),
        MockVoice::ready(Arc::new(VoiceProbe::default())),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    pipeline.start().unwrap();
    let err = pipeline.stop().await.unwrap_err();

    assert!(matches!(err, Error::EmptyAudio(_)), "got {err:?}");
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(upstream.hit_count(), 0);
}

#[tokio::test]
async fn start_is_refused_while_a_cycle_is_active() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hi"),
        MockVoice::ready(Arc::new(VoiceProbe::default())),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    pipeline.start().unwrap();
    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, Error::Pipeline(_)));
}

#[tokio::test]
async fn start_is_refused_when_voice_is_not_ready() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;
    let voice = MockVoice {
        probe: Arc::new(VoiceProbe::default()),
        ready: false,
        fail_speak: false,
    };

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hi"),
        voice,
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    assert!(!pipeline.is_ready());
    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, Error::Pipeline(_)));
}

#[tokio::test]
async fn stop_without_a_recording_is_refused() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hi"),
        MockVoice::ready(Arc::new(VoiceProbe::default())),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    let err = pipeline.stop().await.unwrap_err();
    assert!(matches!(err, Error::Pipeline(_)));
}

#[tokio::test]
async fn speech_failure_does_not_abort_the_cycle() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("spoken reply".into())).await;
    let voice = MockVoice {
        probe: Arc::new(VoiceProbe::default()),
        ready: true,
        fail_speak: true,
    };

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hello"),
        voice,
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    pipeline.start().unwrap();
    let outcome = pipeline.stop().await.unwrap();

    // The transcript and reply survive; only the utterance was lost
    assert_eq!(outcome.reply, "spoken reply");
    assert!(outcome.speech_error.is_some());
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.history().len(), 1);
}

#[tokio::test]
async fn tts_warmup_overlaps_the_completion_call() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;
    let probe = Arc::new(VoiceProbe::default());

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hello"),
        MockVoice::ready(Arc::clone(&probe)),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    pipeline.start().unwrap();
    pipeline.stop().await.unwrap();

    assert!(probe.prepared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn completion_failure_increments_the_retry_counter() {
    let body = r#"{"error":{"message":"Quota exceeded"}}"#;
    let upstream = spawn_upstream(UpstreamBehavior::Status(429, body.into())).await;

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hello"),
        MockVoice::ready(Arc::new(VoiceProbe::default())),
        &upstream.base_url,
        VoiceSettings::default(),
    )
    .await;

    pipeline.start().unwrap();
    let err = pipeline.stop().await.unwrap_err();

    assert!(matches!(err, Error::Upstream { .. }));
    assert_eq!(pipeline.completion_failures(), 1);
    // Partial cycle latency is still recorded
    assert_eq!(pipeline.history().len(), 1);
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[tokio::test]
async fn settings_flow_into_the_utterance() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;
    let probe = Arc::new(VoiceProbe::default());
    let settings = VoiceSettings {
        speech_rate: 1.5,
        speech_volume: 0.4,
        ..VoiceSettings::default()
    };

    let mut pipeline = build_pipeline(
        ScriptedCapture::with(loud_buffer()),
        CountingEngine::new("hello"),
        MockVoice::ready(Arc::clone(&probe)),
        &upstream.base_url,
        settings,
    )
    .await;

    pipeline.start().unwrap();
    pipeline.stop().await.unwrap();

    let utterances = probe.utterances.lock().unwrap();
    let (_, rate, volume) = &utterances[0];
    assert!((rate - 1.5).abs() < f32::EPSILON);
    assert!((volume - 0.4).abs() < f32::EPSILON);
}

#[tokio::test]
async fn consecutive_cycles_grow_the_history() {
    let upstream = spawn_upstream(UpstreamBehavior::Reply("ok".into())).await;
    let probe = Arc::new(VoiceProbe::default());
    let engine = CountingEngine::new("hello");

    let worker = talkback::transcribe::spawn(Arc::clone(&engine) as Arc<dyn SpeechEngine>);
    worker.init().await.unwrap();
    let completion =
        Arc::new(CompletionClient::new(&completion_config(&upstream.base_url)).unwrap());

    // A capture source that always has audio available
    struct Replay;
    impl CaptureSource for Replay {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> Vec<f32> {
            vec![0.5; 16000]
        }
        fn is_active(&self) -> bool {
            false
        }
    }

    let mut pipeline = Pipeline::new(
        Box::new(Replay),
        worker,
        Box::new(MockVoice::ready(probe)),
        completion,
        VoiceSettings::default(),
    );

    for expected in 1..=3 {
        pipeline.start().unwrap();
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.history().len(), expected);
    }

    // Cached replies: the upstream saw exactly one request for the phrase
    assert_eq!(upstream.hit_count(), 1);

    // Latency stages are individually populated
    assert!(pipeline.history().average().unwrap() < Duration::from_secs(5));
}
