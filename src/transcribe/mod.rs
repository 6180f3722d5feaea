//! Transcription through a Whisper-compatible HTTP API.
//!
//! The media file goes up as multipart form data; the verbose response comes
//! back with per-segment timings that are rendered into a timestamped text
//! transcript on disk.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::media::format_clock;
use crate::{Result, StreamVaultError};

/// Verbose transcription response shape.
#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,

    #[serde(default)]
    segments: Vec<ApiSegment>,
}

#[derive(Debug, Deserialize)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Client for the transcription endpoint.
pub struct TranscriptionClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: String,
}

impl TranscriptionClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: settings.transcribe.api_base.trim_end_matches('/').to_string(),
            api_token: settings.auth.api_token.clone(),
            model: settings.transcribe.model.clone(),
        }
    }

    /// Transcribe `media` and write the rendered transcript into `out_dir`.
    pub async fn transcribe(&self, media: &Path, out_dir: &Path) -> Result<PathBuf> {
        if self.api_token.is_empty() {
            return Err(StreamVaultError::Validation(
                "no API token configured for transcription".to_string(),
            )
            .into());
        }

        let file_name = media
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                StreamVaultError::Validation(format!("not a file: {}", media.display()))
            })?;

        tracing::info!("Transcribing {} with {}", file_name, self.model);

        let bytes = tokio::fs::read(media)
            .await
            .with_context(|| format!("could not read {}", media.display()))?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("transcription API returned {}: {}", status, body.trim());
        }

        let transcription: VerboseTranscription = response
            .json()
            .await
            .context("could not parse the transcription response")?;

        let content = render_transcript(&file_name, &self.model, &transcription).ok_or_else(
            || StreamVaultError::EmptyResult("transcript had no spoken content".to_string()),
        )?;

        fs_err::create_dir_all(out_dir)?;
        let stem = media
            .file_stem()
            .map(|s| crate::utils::sanitize_filename(&s.to_string_lossy()))
            .unwrap_or_else(|| "transcript".to_string());
        let out_path = out_dir.join(format!("{}.txt", stem));
        fs_err::write(&out_path, content)?;

        tracing::info!("Transcript saved to {}", out_path.display());
        Ok(out_path)
    }
}

/// Render a transcript document: header plus one timestamped line per
/// segment. `None` when the response carried no usable content.
fn render_transcript(
    source_name: &str,
    model: &str,
    transcription: &VerboseTranscription,
) -> Option<String> {
    let mut lines: Vec<String> = transcription
        .segments
        .iter()
        .filter(|segment| !segment.text.trim().is_empty())
        .map(|segment| {
            format!(
                "[{} - {}] {}",
                format_clock(segment.start),
                format_clock(segment.end),
                segment.text.trim()
            )
        })
        .collect();

    if lines.is_empty() {
        let text = transcription.text.trim();
        if text.is_empty() {
            return None;
        }
        lines.push(text.to_string());
    }

    let header = format!(
        "Source: {}\nTranscribed: {}\nModel: {}\n\n",
        source_name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        model
    );

    Some(header + &lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_render_with_timestamps() {
        let transcription = VerboseTranscription {
            text: "hello world".to_string(),
            segments: vec![
                ApiSegment {
                    start: 0.0,
                    end: 4.5,
                    text: " hello ".to_string(),
                },
                ApiSegment {
                    start: 4.5,
                    end: 90.0,
                    text: "world".to_string(),
                },
            ],
        };

        let rendered = render_transcript("clip.mp4", "whisper-1", &transcription).unwrap();
        assert!(rendered.contains("Source: clip.mp4"));
        assert!(rendered.contains("Model: whisper-1"));
        assert!(rendered.contains("[00:00:00 - 00:00:04] hello"));
        assert!(rendered.contains("[00:00:04 - 00:01:30] world"));
    }

    #[test]
    fn test_plain_text_fallback_without_segments() {
        let transcription = VerboseTranscription {
            text: "just the text".to_string(),
            segments: Vec::new(),
        };

        let rendered = render_transcript("a.mp4", "whisper-1", &transcription).unwrap();
        assert!(rendered.ends_with("just the text"));
    }

    #[test]
    fn test_empty_response_is_none() {
        let transcription = VerboseTranscription {
            text: "   ".to_string(),
            segments: Vec::new(),
        };

        assert!(render_transcript("a.mp4", "whisper-1", &transcription).is_none());
    }

    #[test]
    fn test_blank_segments_fall_back_to_text() {
        let transcription = VerboseTranscription {
            text: "spoken".to_string(),
            segments: vec![ApiSegment {
                start: 0.0,
                end: 1.0,
                text: "  ".to_string(),
            }],
        };

        let rendered = render_transcript("a.mp4", "whisper-1", &transcription).unwrap();
        assert!(rendered.contains("spoken"));
    }
}
