//! Transcription engines
//!
//! An engine turns a mono 16 kHz sample buffer into text. The shipped
//! engine uploads WAV to a Whisper-style HTTP endpoint; tests substitute
//! their own implementations.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::audio::{SAMPLE_RATE, samples_to_wav};
use crate::config::SttConfig;
use crate::{Error, Result};

/// A speech-to-text capability: load once, then transcribe repeatedly
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// One-time initialization; may take tens of seconds
    async fn load(&self) -> Result<()>;

    /// Transcribe a mono 16 kHz buffer to text
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

/// Response from a Whisper-style transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// HTTP speech-to-text engine
///
/// Long recordings are split into overlapping chunks before upload; the
/// chunk length and stride are tuned for latency over accuracy.
pub struct HttpSttEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
    language: Option<String>,
    api_key: SecretString,
    chunk_samples: usize,
    stride_samples: usize,
}

impl HttpSttEngine {
    /// Create an engine from STT configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &SttConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("STT API key required".to_string()))?;

        #[allow(clippy::cast_possible_truncation)]
        let chunk_samples = (config.chunk_length.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let stride_samples = (config.stride.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;

        if stride_samples >= chunk_samples {
            return Err(Error::Config(
                "STT stride must be shorter than the chunk length".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            api_key,
            chunk_samples,
            stride_samples,
        })
    }

    /// Upload one chunk and return its transcript
    async fn transcribe_chunk(&self, samples: &[f32]) -> Result<String> {
        let wav = samples_to_wav(samples, SAMPLE_RATE)?;

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let form = if let Some(ref lang) = self.language {
            form.text("language", lang.clone())
        } else {
            form
        };

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "STT request failed");
                Error::Transcription(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT API error");
            return Err(Error::Transcription(format!("STT API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse STT response: {e}")))?;

        Ok(result.text)
    }
}

#[async_trait]
impl SpeechEngine for HttpSttEngine {
    async fn load(&self) -> Result<()> {
        // Remote engine: nothing to warm locally. A cheap HEAD against the
        // base URL would add a network round trip to every startup for
        // little signal, so readiness is assumed until the first request.
        tracing::debug!(base_url = %self.base_url, model = %self.model, "STT engine ready");
        Ok(())
    }

    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        if samples.is_empty() {
            return Err(Error::EmptyAudio("empty sample buffer".to_string()));
        }

        if samples.len() <= self.chunk_samples {
            let text = self.transcribe_chunk(samples).await?;
            return Ok(text.trim().to_string());
        }

        // Overlapping windows so words on a boundary appear in one chunk whole
        let step = self.chunk_samples - self.stride_samples;
        let mut parts = Vec::new();
        let mut start = 0;

        while start < samples.len() {
            let end = (start + self.chunk_samples).min(samples.len());
            let text = self.transcribe_chunk(&samples[start..end]).await?;
            let text = text.trim();
            if !text.is_empty() {
                parts.push(text.to_string());
            }
            if end == samples.len() {
                break;
            }
            start += step;
        }

        tracing::debug!(chunks = parts.len(), "chunked transcription complete");
        Ok(parts.join(" "))
    }
}
