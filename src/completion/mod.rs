//! Completion request layer
//!
//! Turns a transcript into a prompt, consults the response cache, and calls
//! the remote completion API under a hard deadline. Retry policy lives with
//! the caller (the pipeline coordinator wraps [`retry::with_retry`] around
//! [`CompletionClient::complete`]); this layer performs a single attempt.

mod cache;
pub mod retry;

pub use cache::ResponseCache;
pub use retry::{RetryPolicy, with_retry};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{CompletionConfig, VoiceSettings};
use crate::{Error, Result};

/// Substituted when the API returns no candidate text; the pipeline must
/// always produce some spoken output
pub const FALLBACK_REPLY: &str = "I couldn't generate a response.";

/// Instruction template the transcript is embedded into
fn build_prompt(transcript: &str) -> String {
    format!(
        "You are a helpful voice assistant. Reply briefly and directly, in \
         one or two short sentences suitable for being read aloud.\n\n\
         User said: {transcript}"
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// Voice replies stay short; sampling bounded for consistency
const GENERATION_CONFIG: GenerationConfig = GenerationConfig {
    max_output_tokens: 150,
    temperature: 0.7,
    top_p: 0.9,
    top_k: 40,
};

fn safety_settings() -> Vec<SafetySetting> {
    const CATEGORIES: [&str; 4] = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];
    CATEGORIES
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: "BLOCK_MEDIUM_AND_ABOVE",
        })
        .collect()
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// First candidate's text, if the API produced any
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
    }
}

/// Pull a human-readable message out of an upstream error body
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Client for the remote completion API
#[derive(Debug)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    language: String,
    deadline: std::time::Duration,
    api_key: SecretString,
    cache: ResponseCache,
}

impl CompletionClient {
    /// Create a client from completion configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API credential is absent — a
    /// startup-class failure, not a per-request one
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config(format!(
                "completion API key required (set {})",
                crate::config::COMPLETION_KEY_ENV
            ))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            deadline: config.deadline,
            api_key,
            cache: ResponseCache::new(config.cache_capacity, config.cache_ttl),
        })
    }

    /// Reply locale used as the cache key prefix
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Complete a transcript into a short reply, with an optional locale
    /// override for the cache key and request.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when the deadline elapses, `Error::Upstream` for
    /// non-success statuses
    pub async fn complete_in(
        &self,
        transcript: &str,
        settings: VoiceSettings,
        language: Option<&str>,
    ) -> Result<String> {
        let locale = language.unwrap_or(&self.language);
        let key = ResponseCache::key(transcript, locale);

        if settings.caching_enabled {
            if let Some(text) = self.cache.get(&key) {
                tracing::debug!(key = %key, "completion cache hit");
                return Ok(text);
            }
        }

        let text = self.request_completion(transcript).await?;
        let text = text.trim().to_string();

        if settings.caching_enabled {
            self.cache.insert(key, text.clone());
        }

        Ok(text)
    }

    /// Complete a transcript using the configured locale
    ///
    /// # Errors
    ///
    /// See [`Self::complete_in`]
    pub async fn complete(&self, transcript: &str, settings: VoiceSettings) -> Result<String> {
        self.complete_in(transcript, settings, None).await
    }

    /// One network attempt against the completion API
    async fn request_completion(&self, transcript: &str) -> Result<String> {
        let prompt = build_prompt(transcript);
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: &prompt }],
            }],
            generation_config: GENERATION_CONFIG,
            safety_settings: safety_settings(),
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(self.deadline)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(deadline = ?self.deadline, "completion request timed out");
                    Error::Timeout(self.deadline)
                } else {
                    tracing::error!(error = %e, "completion request failed");
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(&body);
            tracing::error!(status = %status, message = %message, "completion API error");
            return Err(Error::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let result: GenerateResponse = response.json().await?;

        Ok(result.first_text().unwrap_or_else(|| {
            tracing::warn!("completion response had no candidate text, using fallback");
            FALLBACK_REPLY.to_string()
        }))
    }
}
