//! Microphone capture for one recording session

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::watch;

use crate::{Error, Result};

use super::resample;

/// Sample rate the pipeline works in (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Fixed block size the capture callback frames samples into
pub const BLOCK_SIZE: usize = 2048;

/// Peak-amplitude floor below which a block is treated as near-silence
pub const SILENCE_THRESHOLD: f32 = 0.01;

/// Maximum absolute sample amplitude in a buffer
#[must_use]
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Whether a block falls below the silence gate
#[must_use]
pub fn is_silence(block: &[f32]) -> bool {
    peak_amplitude(block) < SILENCE_THRESHOLD
}

/// State shared with the capture callback
struct SessionShared {
    /// Accepted samples, in arrival order
    accepted: Mutex<Vec<f32>>,
    /// Partial block carried across callbacks
    pending: Mutex<Vec<f32>>,
    /// Per-block peak level for metering observers
    level_tx: watch::Sender<f32>,
}

impl SessionShared {
    /// Frame incoming samples into fixed blocks and gate each one.
    ///
    /// Near-silence blocks still feed the level observer but are not
    /// appended, so silent padding never reaches the transcriber.
    fn ingest(&self, data: &[f32]) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        pending.extend_from_slice(data);

        while pending.len() >= BLOCK_SIZE {
            let block: Vec<f32> = pending.drain(..BLOCK_SIZE).collect();
            self.gate_block(&block);
        }
    }

    fn gate_block(&self, block: &[f32]) {
        let peak = peak_amplitude(block);
        let _ = self.level_tx.send(peak);

        if peak >= SILENCE_THRESHOLD {
            if let Ok(mut accepted) = self.accepted.lock() {
                accepted.extend_from_slice(block);
            }
        }
    }

    /// Push the trailing partial block through the gate
    fn flush(&self) {
        let remainder: Vec<f32> = {
            let mut pending = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *pending)
        };

        if !remainder.is_empty() {
            self.gate_block(&remainder);
        }
    }
}

/// One recording session: owns the microphone stream from start to stop.
///
/// The stream is released on every exit path — dropping the session drops
/// the stream, so an error between start and stop cannot leave the device
/// held.
pub struct AudioSession {
    stream: Stream,
    shared: Arc<SessionShared>,
    capture_rate: u32,
    level_rx: watch::Receiver<f32>,
}

impl AudioSession {
    /// Open the default input device and begin capturing
    ///
    /// Prefers a mono 16 kHz stream; falls back to the nearest supported
    /// mono rate, resampled at stop.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if no input device is available, no mono
    /// config exists, or the stream cannot be built
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let (config, capture_rate) = pick_input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            capture_rate,
            channels = config.channels,
            "recording session opening"
        );

        let (level_tx, level_rx) = watch::channel(0.0f32);
        let shared = Arc::new(SessionShared {
            accepted: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            level_tx,
        });

        let callback_shared = Arc::clone(&shared);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    callback_shared.ingest(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        Ok(Self {
            stream,
            shared,
            capture_rate,
            level_rx,
        })
    }

    /// Observer handle for per-block peak levels (waveform metering)
    #[must_use]
    pub fn level_watch(&self) -> watch::Receiver<f32> {
        self.level_rx.clone()
    }

    /// Stop capturing and return the accepted samples at 16 kHz.
    ///
    /// Consuming `self` guarantees no blocks are appended after stop. An
    /// empty return means no block cleared the silence gate — a valid
    /// "no speech captured" outcome, not an error.
    #[must_use]
    pub fn stop(self) -> Vec<f32> {
        drop(self.stream);
        self.shared.flush();

        let accepted = {
            let mut accepted = match self.shared.accepted.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *accepted)
        };

        tracing::debug!(
            samples = accepted.len(),
            capture_rate = self.capture_rate,
            "recording session stopped"
        );

        if self.capture_rate == SAMPLE_RATE || accepted.is_empty() {
            return accepted;
        }

        match resample(&accepted, self.capture_rate, SAMPLE_RATE) {
            Ok(resampled) => resampled,
            Err(e) => {
                tracing::error!(error = %e, "resample failed, returning native-rate audio");
                accepted
            }
        }
    }
}

/// Pick a mono input config, preferring 16 kHz, else the nearest rate
fn pick_input_config(device: &cpal::Device) -> Result<(StreamConfig, u32)> {
    let configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Device(e.to_string()))?
        .filter(|c| c.channels() == 1)
        .collect();

    if let Some(exact) = configs.iter().find(|c| {
        c.min_sample_rate() <= SampleRate(SAMPLE_RATE) && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
    }) {
        let config = exact.clone().with_sample_rate(SampleRate(SAMPLE_RATE)).config();
        return Ok((config, SAMPLE_RATE));
    }

    // No 16 kHz support: clamp to whichever supported range edge is closest
    let nearest = configs
        .iter()
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let clamped = SAMPLE_RATE.clamp(min, max);
            clamped.abs_diff(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Device("no mono input config found".to_string()))?;

    let rate = SAMPLE_RATE.clamp(nearest.min_sample_rate().0, nearest.max_sample_rate().0);
    let config = nearest.clone().with_sample_rate(SampleRate(rate)).config();

    tracing::debug!(rate, "16 kHz unsupported, capturing at nearest rate");
    Ok((config, rate))
}

/// Microphone-backed [`super::CaptureSource`]
#[derive(Default)]
pub struct MicSource {
    session: Option<AudioSession>,
}

impl MicSource {
    /// Create an idle microphone source
    #[must_use]
    pub const fn new() -> Self {
        Self { session: None }
    }

    /// Level observer for the active session, if recording
    #[must_use]
    pub fn level_watch(&self) -> Option<watch::Receiver<f32>> {
        self.session.as_ref().map(AudioSession::level_watch)
    }
}

impl super::CaptureSource for MicSource {
    fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        self.session = Some(AudioSession::open()?);
        Ok(())
    }

    fn stop(&mut self) -> Vec<f32> {
        self.session.take().map(AudioSession::stop).unwrap_or_default()
    }

    fn is_active(&self) -> bool {
        self.session.is_some()
    }
}

/// Convert f32 samples to WAV bytes for STT upload
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Device(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Device(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Device(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_of_silence_is_zero() {
        assert!(peak_amplitude(&vec![0.0f32; BLOCK_SIZE]) < f32::EPSILON);
    }

    #[test]
    fn peak_tracks_largest_magnitude() {
        let samples = vec![0.1, -0.7, 0.3];
        assert!((peak_amplitude(&samples) - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn silence_gate_threshold() {
        assert!(is_silence(&vec![0.009f32; BLOCK_SIZE]));
        assert!(!is_silence(&vec![0.011f32; BLOCK_SIZE]));
    }

    #[test]
    fn ingest_frames_and_gates_blocks() {
        let (level_tx, mut level_rx) = watch::channel(0.0f32);
        let shared = SessionShared {
            accepted: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            level_tx,
        };

        // One loud block, one silent block, and a loud partial remainder
        let mut data = vec![0.5f32; BLOCK_SIZE];
        data.extend(vec![0.001f32; BLOCK_SIZE]);
        data.extend(vec![0.5f32; 100]);
        shared.ingest(&data);

        // Only the loud full block was accepted so far
        assert_eq!(shared.accepted.lock().unwrap().len(), BLOCK_SIZE);
        // The silent block still reached the level observer
        assert!(level_rx.has_changed().unwrap());

        // Flushing gates the partial remainder too
        shared.flush();
        assert_eq!(shared.accepted.lock().unwrap().len(), BLOCK_SIZE + 100);
        assert!(shared.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn flush_discards_silent_remainder() {
        let (level_tx, _level_rx) = watch::channel(0.0f32);
        let shared = SessionShared {
            accepted: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            level_tx,
        };

        shared.ingest(&vec![0.001f32; 300]);
        shared.flush();

        assert!(shared.accepted.lock().unwrap().is_empty());
    }

    #[test]
    fn wav_encoding_roundtrip() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.channels, 1);
        assert_eq!(reader.samples::<i16>().count(), samples.len());
    }
}
