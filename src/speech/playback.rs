//! Utterance playback to the default output device
//!
//! At most one utterance plays at a time: starting a new one cancels the
//! current one, and `stop` is safe to call when nothing is playing.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Poll interval while waiting for an utterance to finish
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Plays synthesized utterances to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
    /// Cancel flag of the utterance currently playing, if any
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl AudioPlayback {
    /// Create a playback instance bound to the default output device
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no output device or usable config exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: stereo, duplicating the mono signal
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            current: Mutex::new(None),
        })
    }

    /// Play an MP3 utterance at the given volume, awaiting completion.
    ///
    /// Cancels whatever is currently playing first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Speech` if decoding or the output stream fails
    #[allow(clippy::future_not_send)]
    pub async fn play_mp3(&self, mp3_data: &[u8], volume: f32) -> Result<()> {
        let mut samples = decode_mp3(mp3_data)?;
        for sample in &mut samples {
            *sample *= volume;
        }
        self.play_samples(samples).await
    }

    /// Play raw f32 samples, awaiting completion (hardware smoke tests)
    ///
    /// # Errors
    ///
    /// Returns `Error::Speech` if the output stream fails
    #[allow(clippy::future_not_send)]
    pub async fn play(&self, samples: Vec<f32>) -> Result<()> {
        self.play_samples(samples).await
    }

    /// Cancel the current utterance, if any. Safe when idle.
    pub fn stop(&self) {
        let current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(ref cancel) = *current {
            cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Install a fresh cancel flag, cancelling the previous utterance
    fn swap_cancel_flag(&self) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = current.replace(Arc::clone(&cancel)) {
            previous.store(true, Ordering::SeqCst);
        }
        cancel
    }

    #[allow(clippy::future_not_send)]
    async fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let cancel = self.swap_cancel_flag();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let sample_count = samples.len();

        let finished = Arc::new(AtomicBool::new(false));
        let callback_finished = Arc::clone(&finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = if position < samples.len() {
                            let s = samples[position];
                            position += 1;
                            s
                        } else {
                            callback_finished.store(true, Ordering::SeqCst);
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Speech(e.to_string()))?;

        stream.play().map_err(|e| Error::Speech(e.to_string()))?;

        // Poll for completion, bounded by the utterance length plus margin
        let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::SeqCst) && !cancel.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        drop(stream);

        if cancel.load(Ordering::SeqCst) {
            tracing::debug!("utterance cancelled");
        } else {
            tracing::debug!(samples = sample_count, "utterance complete");
        }

        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels down to mono
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Speech(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
