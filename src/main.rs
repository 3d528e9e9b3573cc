use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use talkback::audio::MicSource;
use talkback::pipeline::{Pipeline, PipelineState};
use talkback::speech::{AudioPlayback, DeviceVoice, Synthesizer};
use talkback::transcribe::HttpSttEngine;
use talkback::{ApiServer, CompletionClient, Config};

/// Talkback - push-to-talk voice interaction pipeline
#[derive(Parser)]
#[command(name = "talkback", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "TALKBACK_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for headless servers without audio hardware)
    #[arg(long, env = "TALKBACK_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize and play a line of text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,talkback=info",
        1 => "info,talkback=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(&text).await,
        };
    }

    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    // Missing completion credential is a startup-class failure
    let completion = Arc::new(CompletionClient::new(&config.completion)?);

    let server = ApiServer::new(&config, Arc::clone(&completion));
    tracing::info!(port = config.server.port, "starting talkback");

    if cli.disable_voice {
        tracing::info!("voice disabled - serving the chat API only");
        server.run().await?;
        return Ok(());
    }

    let server_task = tokio::spawn(server.run());

    // Voice loop stays on the main thread (cpal streams aren't Send)
    let result = run_voice_loop(&config, completion).await;

    server_task.abort();
    result
}

/// Interactive push-to-talk loop: Enter starts a recording, Enter stops it
#[allow(clippy::future_not_send)]
async fn run_voice_loop(
    config: &Config,
    completion: Arc<CompletionClient>,
) -> anyhow::Result<()> {
    let engine = HttpSttEngine::new(&config.stt)?;
    let worker = talkback::transcribe::spawn(Arc::new(engine));
    worker.init().await?;

    let synth = Synthesizer::new(&config.tts)?;
    let playback = AudioPlayback::new()?;
    let voice = DeviceVoice::new(synth, playback);

    // Warm the ready gate before accepting the first cycle; prepare is
    // bounded, a still-pending discovery just delays readiness
    use talkback::speech::VoiceOutput as _;
    voice.prepare().await;

    let mut pipeline = Pipeline::new(
        Box::new(MicSource::new()),
        worker,
        Box::new(voice),
        completion,
        config.settings,
    );

    println!("Press Enter to start recording, Enter again to stop. Ctrl-C exits.");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nbye");
                break;
            }
            line = lines.next_line() => {
                if line?.is_none() {
                    break;
                }

                match pipeline.state() {
                    PipelineState::Idle => match pipeline.start() {
                        Ok(()) => println!("recording... (Enter to stop)"),
                        Err(e) => println!("cannot start: {e}"),
                    },
                    PipelineState::Recording => match pipeline.stop().await {
                        Ok(outcome) => {
                            println!("you said: {}", outcome.transcript);
                            println!("reply:    {}", outcome.reply);
                            if let Some(ref err) = outcome.speech_error {
                                println!("(speech output failed: {err})");
                            }
                            println!(
                                "latency:  {} ms total (avg {} ms over {} cycles)",
                                outcome.latency.total.as_millis(),
                                pipeline
                                    .history()
                                    .average()
                                    .unwrap_or_default()
                                    .as_millis(),
                                pipeline.history().len(),
                            );
                        }
                        Err(e) => println!("cycle failed: {e}"),
                    },
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    use talkback::CaptureSource as _;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = MicSource::new();
    mic.start()?;
    let level = mic
        .level_watch()
        .ok_or_else(|| anyhow::anyhow!("no active session"))?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let peak = *level.borrow();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (peak * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] Peak: {:.4} | [{}]", i + 1, peak, meter);
    }

    let samples = mic.stop();

    println!("\n---");
    println!(
        "Captured {} samples above the silence gate.",
        samples.len()
    );
    println!("If the meter stayed at zero, check your input device and levels.");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24000_f32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    playback.play(samples).await?;

    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Synthesize and play a line of text
#[allow(clippy::future_not_send)]
async fn say(text: &str) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"\n");

    let config = Config::load()?;
    let synth = Synthesizer::new(&config.tts)?;
    let voice = synth.discover().await?;
    println!("Voice: {}", voice.name);

    let audio = synth.synthesize(text, config.settings.speech_rate).await?;
    println!("Got {} bytes of audio data", audio.len());

    let playback = AudioPlayback::new()?;
    playback.play_mp3(&audio, config.settings.speech_volume).await?;

    println!("If you heard the speech, TTS is working!");
    Ok(())
}
