//! TOML configuration file loading
//!
//! Supports `~/.config/talkback/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.
//! API credentials never live in the file; they come from the environment.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TalkbackConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Completion API configuration
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Per-cycle voice settings defaults
    #[serde(default)]
    pub settings: SettingsFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Requests allowed per rate window, per client address
    pub rate_limit_max: Option<u32>,

    /// Rate window length in seconds
    pub rate_limit_window_secs: Option<u64>,
}

/// Completion API configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    /// API base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: Option<String>,

    /// Reply locale (e.g. "en-US"), used as the cache key prefix
    pub language: Option<String>,

    /// Hard request deadline in seconds
    pub deadline_secs: Option<u64>,

    /// Response cache time-to-live in seconds
    pub cache_ttl_secs: Option<u64>,

    /// Response cache entry cap
    pub cache_capacity: Option<usize>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// API base URL
    pub base_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub model: Option<String>,

    /// Transcription language hint (e.g. "en")
    pub language: Option<String>,

    /// Chunk length in seconds for long recordings
    pub chunk_length_secs: Option<u64>,

    /// Overlap between chunks in seconds
    pub stride_secs: Option<u64>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// API base URL
    pub base_url: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub model: Option<String>,

    /// Target voice locale (e.g. "en-US")
    pub voice_locale: Option<String>,
}

/// Per-cycle voice settings defaults
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFileConfig {
    /// Speech rate multiplier
    pub speech_rate: Option<f32>,

    /// Speech volume, 0.0 to 1.0
    pub speech_volume: Option<f32>,

    /// Whether the completion response cache is consulted
    pub caching_enabled: Option<bool>,

    /// Completion retry attempts
    pub max_retries: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `TalkbackConfigFile::default()` if the file doesn't exist or
/// can't be parsed.
pub fn load_config_file() -> TalkbackConfigFile {
    let Some(path) = config_file_path() else {
        return TalkbackConfigFile::default();
    };

    if !path.exists() {
        return TalkbackConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TalkbackConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TalkbackConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/talkback/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("talkback").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_overlay() {
        let content = r#"
            [completion]
            model = "gemini-2.0-flash"
            cache_ttl_secs = 120

            [settings]
            caching_enabled = false
        "#;

        let file: TalkbackConfigFile = toml::from_str(content).unwrap();
        assert_eq!(file.completion.model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(file.completion.cache_ttl_secs, Some(120));
        assert_eq!(file.settings.caching_enabled, Some(false));
        assert!(file.server.port.is_none());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let file: TalkbackConfigFile = toml::from_str("").unwrap();
        assert!(file.completion.base_url.is_none());
        assert!(file.settings.speech_rate.is_none());
    }
}
