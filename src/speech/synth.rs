//! Remote speech synthesis with lazy voice discovery

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::config::TtsConfig;
use crate::{Error, Result};

/// Attempts before voice discovery gives up for this call
const VOICE_POLL_ATTEMPTS: u32 = 5;

/// Delay between discovery attempts
const VOICE_POLL_DELAY: Duration = Duration::from_millis(300);

/// A synthesis voice reported by the platform
#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    /// Voice identifier passed back on synthesis
    pub id: String,
    /// Display name
    pub name: String,
    /// Voice locale (e.g. "en-US")
    #[serde(default)]
    pub locale: String,
}

#[derive(Deserialize)]
struct VoiceCatalog {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// Voices every deployment of the synthesis API ships, used when the
/// platform exposes no catalog endpoint
fn builtin_voices() -> Vec<Voice> {
    ["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
        .into_iter()
        .map(|id| Voice {
            id: id.to_string(),
            name: id.to_string(),
            locale: "en-US".to_string(),
        })
        .collect()
}

/// Pick a voice matching the target locale, falling back to the primary
/// language subtag, then to the first voice available.
#[must_use]
pub fn select_voice(voices: &[Voice], target_locale: &str) -> Option<Voice> {
    let target = target_locale.to_lowercase();
    let primary = target.split('-').next().unwrap_or(&target);

    voices
        .iter()
        .find(|v| v.locale.to_lowercase() == target)
        .or_else(|| {
            voices
                .iter()
                .find(|v| v.locale.to_lowercase().starts_with(primary))
        })
        .or_else(|| voices.first())
        .cloned()
}

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Synthesizes speech from text via a remote TTS API
pub struct Synthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice_locale: String,
    api_key: SecretString,
    selected: OnceCell<Voice>,
}

impl Synthesizer {
    /// Create a synthesizer from TTS configuration
    ///
    /// Voice discovery is lazy; construction performs no network calls.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("TTS API key required".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            voice_locale: config.voice_locale.clone(),
            api_key,
            selected: OnceCell::new(),
        })
    }

    /// Whether voice discovery has completed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.selected.initialized()
    }

    /// The selected voice, once discovery has completed
    #[must_use]
    pub fn voice(&self) -> Option<&Voice> {
        self.selected.get()
    }

    /// Discover and select a voice, polling until the platform reports a
    /// non-empty catalog or attempts run out. Platforms without a catalog
    /// endpoint fall back to the built-in voice set. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Speech` only if selection fails outright; the
    /// built-in fallback makes that unreachable in practice
    pub async fn discover(&self) -> Result<&Voice> {
        self.selected
            .get_or_try_init(|| async {
                for attempt in 1..=VOICE_POLL_ATTEMPTS {
                    match self.fetch_voices().await {
                        Ok(voices) if !voices.is_empty() => {
                            if let Some(voice) = select_voice(&voices, &self.voice_locale) {
                                tracing::info!(
                                    voice = %voice.name,
                                    locale = %voice.locale,
                                    "synthesis voice selected"
                                );
                                return Ok(voice);
                            }
                        }
                        Ok(_) => tracing::debug!(attempt, "no voices reported yet, polling"),
                        Err(e) => tracing::debug!(attempt, error = %e, "voice catalog unavailable"),
                    }

                    if attempt < VOICE_POLL_ATTEMPTS {
                        tokio::time::sleep(VOICE_POLL_DELAY).await;
                    }
                }

                let builtin = builtin_voices();
                select_voice(&builtin, &self.voice_locale)
                    .inspect(|voice| {
                        tracing::info!(voice = %voice.name, "using built-in voice set");
                    })
                    .ok_or_else(|| Error::Speech("no synthesis voices available".to_string()))
            })
            .await
    }

    async fn fetch_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(format!("{}/audio/voices", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| Error::Speech(format!("voice discovery failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("voice catalog error {status}: {body}")));
        }

        let catalog: VoiceCatalog = response
            .json()
            .await
            .map_err(|e| Error::Speech(format!("bad voice catalog: {e}")))?;

        Ok(catalog.voices)
    }

    /// Synthesize text to MP3 bytes at the given rate
    ///
    /// # Errors
    ///
    /// Returns `Error::Speech` if not ready or synthesis fails
    pub async fn synthesize(&self, text: &str, rate: f32) -> Result<Vec<u8>> {
        let voice = self
            .selected
            .get()
            .ok_or_else(|| Error::Speech("synthesis voices not loaded".to_string()))?;

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &voice.id,
            speed: rate,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Speech(format!("synthesis request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Speech(format!("synthesis body read failed: {e}")))?;
        Ok(audio.to_vec())
    }
}
