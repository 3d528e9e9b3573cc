//! Layered configuration
//!
//! Defaults ← optional TOML file (`~/.config/talkback/config.toml`) ←
//! environment. API credentials come only from the environment and are held
//! as [`SecretString`] so they never land in debug output.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

pub use file::{TalkbackConfigFile, config_file_path, load_config_file};

/// Environment variable holding the completion API credential
pub const COMPLETION_KEY_ENV: &str = "GEMINI_API_KEY";

/// Environment variable holding the STT/TTS credential
pub const SPEECH_KEY_ENV: &str = "OPENAI_API_KEY";

/// Per-cycle voice settings, owned by the coordinator and passed by value
/// into the output unit and request layer on each call.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSettings {
    /// Speech rate multiplier
    pub speech_rate: f32,
    /// Speech volume, 0.0 to 1.0
    pub speech_volume: f32,
    /// Whether the completion response cache is consulted
    pub caching_enabled: bool,
    /// Completion retry attempts on transient failure
    pub max_retries: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            speech_rate: 1.0,
            speech_volume: 1.0,
            caching_enabled: true,
            max_retries: 3,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the API server binds to
    pub port: u16,
    /// Requests allowed per window, per client address
    pub rate_limit_max: u32,
    /// Rate window length
    pub rate_limit_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 18990,
            rate_limit_max: 30,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

/// Completion API configuration
#[derive(Clone)]
pub struct CompletionConfig {
    /// API base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Reply locale, prefixed onto cache keys
    pub language: String,
    /// Hard request deadline
    pub deadline: Duration,
    /// Response cache time-to-live
    pub cache_ttl: Duration,
    /// Response cache entry cap
    pub cache_capacity: usize,
    /// API credential (from the environment)
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("deadline", &self.deadline)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            language: "en-US".to_string(),
            deadline: Duration::from_secs(8),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 512,
            api_key: None,
        }
    }
}

/// Speech-to-text configuration
#[derive(Clone)]
pub struct SttConfig {
    /// API base URL
    pub base_url: String,
    /// STT model identifier
    pub model: String,
    /// Transcription language hint
    pub language: Option<String>,
    /// Chunk length for long recordings
    pub chunk_length: Duration,
    /// Overlap between consecutive chunks
    pub stride: Duration,
    /// API credential (from the environment)
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SttConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .field("chunk_length", &self.chunk_length)
            .field("stride", &self.stride)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            language: None,
            // Short chunks with a small stride favor latency over accuracy
            chunk_length: Duration::from_secs(12),
            stride: Duration::from_secs(2),
            api_key: None,
        }
    }
}

/// Text-to-speech configuration
#[derive(Clone)]
pub struct TtsConfig {
    /// API base URL
    pub base_url: String,
    /// TTS model identifier
    pub model: String,
    /// Target voice locale
    pub voice_locale: String,
    /// API credential (from the environment)
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice_locale", &self.voice_locale)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "tts-1".to_string(),
            voice_locale: "en-US".to_string(),
            api_key: None,
        }
    }
}

/// Resolved talkback configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Completion API configuration
    pub completion: CompletionConfig,
    /// Speech-to-text configuration
    pub stt: SttConfig,
    /// Text-to-speech configuration
    pub tts: TtsConfig,
    /// Per-cycle voice settings defaults
    pub settings: VoiceSettings,
}

impl Config {
    /// Load configuration: defaults, then the TOML overlay, then environment
    ///
    /// # Errors
    ///
    /// Returns error if environment values fail validation
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(&load_config_file());
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay values from the config file onto this configuration
    pub fn apply_file(&mut self, file: &TalkbackConfigFile) {
        if let Some(port) = file.server.port {
            self.server.port = port;
        }
        if let Some(max) = file.server.rate_limit_max {
            self.server.rate_limit_max = max;
        }
        if let Some(secs) = file.server.rate_limit_window_secs {
            self.server.rate_limit_window = Duration::from_secs(secs);
        }

        if let Some(ref url) = file.completion.base_url {
            self.completion.base_url = url.clone();
        }
        if let Some(ref model) = file.completion.model {
            self.completion.model = model.clone();
        }
        if let Some(ref language) = file.completion.language {
            self.completion.language = language.clone();
        }
        if let Some(secs) = file.completion.deadline_secs {
            self.completion.deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = file.completion.cache_ttl_secs {
            self.completion.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = file.completion.cache_capacity {
            self.completion.cache_capacity = capacity;
        }

        if let Some(ref url) = file.stt.base_url {
            self.stt.base_url = url.clone();
        }
        if let Some(ref model) = file.stt.model {
            self.stt.model = model.clone();
        }
        if let Some(ref language) = file.stt.language {
            self.stt.language = Some(language.clone());
        }
        if let Some(secs) = file.stt.chunk_length_secs {
            self.stt.chunk_length = Duration::from_secs(secs);
        }
        if let Some(secs) = file.stt.stride_secs {
            self.stt.stride = Duration::from_secs(secs);
        }

        if let Some(ref url) = file.tts.base_url {
            self.tts.base_url = url.clone();
        }
        if let Some(ref model) = file.tts.model {
            self.tts.model = model.clone();
        }
        if let Some(ref locale) = file.tts.voice_locale {
            self.tts.voice_locale = locale.clone();
        }

        if let Some(rate) = file.settings.speech_rate {
            self.settings.speech_rate = rate;
        }
        if let Some(volume) = file.settings.speech_volume {
            self.settings.speech_volume = volume;
        }
        if let Some(enabled) = file.settings.caching_enabled {
            self.settings.caching_enabled = enabled;
        }
        if let Some(retries) = file.settings.max_retries {
            self.settings.max_retries = retries;
        }
    }

    /// Pull API credentials from the environment
    ///
    /// # Errors
    ///
    /// Returns error if the settings fail validation
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(key) = std::env::var(COMPLETION_KEY_ENV) {
            if !key.is_empty() {
                self.completion.api_key = Some(SecretString::from(key));
            }
        }
        if let Ok(key) = std::env::var(SPEECH_KEY_ENV) {
            if !key.is_empty() {
                let key = SecretString::from(key);
                self.stt.api_key = Some(key.clone());
                self.tts.api_key = Some(key);
            }
        }

        if !(0.0..=1.0).contains(&self.settings.speech_volume) {
            return Err(Error::Config(format!(
                "speech_volume must be within 0.0..=1.0, got {}",
                self.settings.speech_volume
            )));
        }

        Ok(())
    }
}
