//! Transcript summarization collaborators.
//!
//! Each backend gets its own `Summarizer` implementation; the active one is
//! selected through the enum-keyed factory rather than branching on provider
//! strings at call sites.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::{Result, StreamVaultError};

/// Which summarization backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryProvider {
    #[default]
    OpenAi,
    Ollama,
}

impl std::fmt::Display for SummaryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryProvider::OpenAi => write!(f, "openai"),
            SummaryProvider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Result of one summarization call.
#[derive(Debug, Clone)]
pub struct Summary {
    pub content: String,
    pub model: String,
    pub truncated: bool,
    pub input_characters: usize,
}

/// A summarization backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<Summary>;

    fn provider(&self) -> SummaryProvider;
}

/// One implementation per provider, keyed by the enum.
pub fn create_summarizer(settings: &Settings) -> Box<dyn Summarizer> {
    match settings.summary.provider {
        SummaryProvider::OpenAi => Box::new(OpenAiSummarizer::new(settings)),
        SummaryProvider::Ollama => Box::new(OllamaSummarizer::new(settings)),
    }
}

/// Summarize a transcript file into `out_dir`, honoring the character budget.
pub async fn summarize_to_file(
    summarizer: &dyn Summarizer,
    transcript_path: &Path,
    out_dir: &Path,
    max_chars: usize,
) -> Result<PathBuf> {
    let text = fs_err::read_to_string(transcript_path)?;
    let (snippet, truncated) = truncate_transcript(&text, max_chars);
    if snippet.trim().is_empty() {
        return Err(StreamVaultError::EmptyResult(format!(
            "transcript {} is empty",
            transcript_path.display()
        ))
        .into());
    }
    if truncated {
        tracing::info!(
            "Transcript truncated to {} characters for summarization",
            max_chars
        );
    }

    let mut summary = summarizer.summarize(snippet).await?;
    summary.truncated = truncated;

    fs_err::create_dir_all(out_dir)?;
    let stem = transcript_path
        .file_stem()
        .map(|s| crate::utils::sanitize_filename(&s.to_string_lossy()))
        .unwrap_or_else(|| "transcript".to_string());
    let out_path = out_dir.join(format!("{}_summary.txt", stem));

    let header = format!(
        "Source: {}\nModel: {}\nInput characters: {}{}\n\n",
        transcript_path.display(),
        summary.model,
        summary.input_characters,
        if summary.truncated { " (truncated)" } else { "" }
    );
    fs_err::write(&out_path, header + &summary.content)?;

    tracing::info!("Summary saved to {}", out_path.display());
    Ok(out_path)
}

const SYSTEM_PROMPT: &str = "You are an assistant that distills broadcast transcripts. \
    Keep the key events in order and attribute important statements to their speakers.";

fn user_prompt(transcript: &str) -> String {
    format!(
        "Condense the transcript below into 5-7 key bullets, then one sentence \
         capturing the overall context. Drop greetings and repetition.\n\nTranscript:\n{}",
        transcript
    )
}

/// Cut the transcript at the character budget, on a character boundary.
pub fn truncate_transcript(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Chat-completions summarizer (OpenAI-compatible endpoints).
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: settings.summary.api_base.trim_end_matches('/').to_string(),
            api_token: settings.auth.api_token.clone(),
            model: settings.summary.model.clone(),
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<Summary> {
        if self.api_token.is_empty() {
            return Err(StreamVaultError::Validation(
                "no API token configured for summarization".to_string(),
            )
            .into());
        }

        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(transcript)},
            ],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .context("summarization request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("summarization API returned {}: {}", status, body.trim());
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("could not parse the summarization response")?;

        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(
                StreamVaultError::EmptyResult("the summary came back empty".to_string()).into(),
            );
        }

        Ok(Summary {
            content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            truncated: false,
            input_characters: transcript.chars().count(),
        })
    }

    fn provider(&self) -> SummaryProvider {
        SummaryProvider::OpenAi
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Local Ollama summarizer.
pub struct OllamaSummarizer {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.summary.ollama_base.trim_end_matches('/').to_string(),
            model: settings.summary.model.clone(),
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<Summary> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(transcript)},
            ],
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("summarization request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {}: {}", status, body.trim());
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("could not parse the Ollama response")?;

        let content = parsed.message.content.trim().to_string();
        if content.is_empty() {
            return Err(
                StreamVaultError::EmptyResult("the summary came back empty".to_string()).into(),
            );
        }

        Ok(Summary {
            content,
            model: self.model.clone(),
            truncated: false,
            input_characters: transcript.chars().count(),
        })
    }

    fn provider(&self) -> SummaryProvider {
        SummaryProvider::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let (cut, truncated) = truncate_transcript("한국어 방송 전사", 3);
        assert_eq!(cut, "한국어");
        assert!(truncated);

        let (whole, truncated) = truncate_transcript("short", 100);
        assert_eq!(whole, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_factory_selects_by_enum() {
        let mut settings = Settings::default();

        settings.summary.provider = SummaryProvider::OpenAi;
        assert_eq!(create_summarizer(&settings).provider(), SummaryProvider::OpenAi);

        settings.summary.provider = SummaryProvider::Ollama;
        assert_eq!(create_summarizer(&settings).provider(), SummaryProvider::Ollama);
    }

    #[test]
    fn test_provider_parses_from_config_text() {
        let provider: SummaryProvider = serde_yaml::from_str("ollama").unwrap();
        assert_eq!(provider, SummaryProvider::Ollama);
        assert_eq!(provider.to_string(), "ollama");
    }

    #[test]
    fn test_prompt_carries_transcript() {
        let prompt = user_prompt("[00:00:00 - 00:00:05] hello");
        assert!(prompt.contains("hello"));
        assert!(prompt.contains("5-7 key bullets"));
    }

    #[test]
    fn test_chat_response_shape() {
        let raw = r#"{"model":"gpt-4o-mini","choices":[{"message":{"role":"assistant","content":"- point"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "- point");
    }
}
