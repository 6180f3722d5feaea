use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::summarize::SummaryProvider;

/// Merged application settings: site defaults overlaid with user overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Local artifact directories
    pub paths: PathsConfig,

    /// Remote store (rclone) configuration
    pub remote: RemoteConfig,

    /// Credentials for API collaborators
    pub auth: AuthConfig,

    /// Live capture tuning
    pub recording: RecordingConfig,

    /// Transcription collaborator settings
    pub transcribe: TranscribeConfig,

    /// Summarization collaborator settings
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where live captures land
    pub recordings: PathBuf,

    /// Older capture directories still worth scanning after a stop
    pub legacy_recordings: Vec<PathBuf>,

    /// Where link downloads land
    pub downloads: PathBuf,

    /// Single-frame captures from live streams
    pub captures: PathBuf,

    /// Rendered transcripts
    pub transcripts: PathBuf,

    /// Rendered summaries
    pub summaries: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Name of the configured rclone remote
    pub remote_name: String,

    /// Destination folder for stopped live captures
    pub recording_folder: String,

    /// Destination folder for link downloads
    pub download_folder: String,

    /// Destination folder for transcripts
    pub transcript_folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token for the transcription/summarization APIs
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// How long to wait after a graceful interrupt before escalating
    pub stop_timeout_secs: u64,

    /// Smallest capture considered a real artifact (rejects truncated files)
    pub min_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Whisper-compatible API base URL
    pub api_base: String,

    /// Model name passed to the transcription endpoint
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Which summarization backend to use
    pub provider: SummaryProvider,

    /// Model name for the selected provider
    pub model: String,

    /// Chat-completions style API base URL
    pub api_base: String,

    /// Local Ollama server base URL
    pub ollama_base: String,

    /// Transcript character budget before truncation
    pub max_chars: usize,
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamvault")
}

impl Default for PathsConfig {
    fn default() -> Self {
        let root = default_root();
        Self {
            recordings: root.join("recordings"),
            legacy_recordings: Vec::new(),
            downloads: root.join("downloads"),
            captures: root.join("captures"),
            transcripts: root.join("transcripts"),
            summaries: root.join("summaries"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            remote_name: "gdrive".to_string(),
            recording_folder: "recordings".to_string(),
            download_folder: "downloads".to_string(),
            transcript_folder: "transcripts".to_string(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 15,
            min_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            ollama_base: "http://127.0.0.1:11434".to_string(),
            max_chars: 12_000,
        }
    }
}

impl Settings {
    /// Load merged defaults + user overrides and make sure the configured
    /// local directories exist.
    pub fn load() -> Result<Self> {
        let root = Self::config_root()?;
        let merged = Self::load_merged(&root.join("defaults.yaml"), &root.join("user_settings.yaml"))?;
        merged.ensure_local_paths()?;
        Ok(merged)
    }

    /// Persist the current settings as the user override file.
    pub fn save(&self) -> Result<()> {
        let root = Self::config_root()?;
        fs_err::create_dir_all(&root)?;

        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;
        fs_err::write(root.join("user_settings.yaml"), content)
            .context("Failed to write user settings")?;

        Ok(())
    }

    /// Every directory a stopped capture may have landed in, newest layout first.
    pub fn recording_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.paths.recordings.clone()];
        dirs.extend(self.paths.legacy_recordings.iter().cloned());
        dirs
    }

    /// Remote path `folder` inside the configured rclone remote.
    pub fn remote_path(&self, folder: &str) -> String {
        format!("{}:{}", self.remote.remote_name, folder)
    }

    fn load_merged(defaults_path: &std::path::Path, overrides_path: &std::path::Path) -> Result<Self> {
        let mut merged = serde_yaml::to_value(Settings::default())
            .context("Failed to encode built-in defaults")?;

        for path in [defaults_path, overrides_path] {
            if !path.exists() {
                continue;
            }
            let content = fs_err::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let overlay: serde_yaml::Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            merge_values(&mut merged, overlay);
        }

        serde_yaml::from_value(merged).context("Failed to interpret merged settings")
    }

    fn config_root() -> Result<PathBuf> {
        // A local config directory wins for easy testing
        let local = PathBuf::from("config");
        if local.is_dir() {
            return Ok(local);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("streamvault"))
    }

    fn ensure_local_paths(&self) -> Result<()> {
        for dir in [
            &self.paths.recordings,
            &self.paths.downloads,
            &self.paths.captures,
            &self.paths.transcripts,
            &self.paths.summaries,
        ] {
            fs_err::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Recordings: {}", self.paths.recordings.display());
        println!("  Downloads: {}", self.paths.downloads.display());
        println!("  Remote: {}", self.remote.remote_name);
        println!("  Recording folder: {}", self.remote.recording_folder);
        println!("  Stop timeout: {}s", self.recording.stop_timeout_secs);
        println!("  Summary provider: {}", self.summary.provider);
        println!("  Summary model: {}", self.summary.model);
    }
}

/// Deep-merge `overlay` into `base`: mappings merge per key, everything else
/// is replaced by the overlay value.
fn merge_values(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_scalars_keeps_siblings() {
        let mut base = serde_yaml::to_value(Settings::default()).unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str(
            "remote:\n  remote_name: archive\nrecording:\n  stop_timeout_secs: 30\n",
        )
        .unwrap();

        merge_values(&mut base, overlay);
        let merged: Settings = serde_yaml::from_value(base).unwrap();

        assert_eq!(merged.remote.remote_name, "archive");
        assert_eq!(merged.recording.stop_timeout_secs, 30);
        // Untouched sibling keys keep their defaults
        assert_eq!(merged.remote.download_folder, "downloads");
        assert_eq!(merged.recording.min_upload_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_merge_later_overlay_wins() {
        let mut base: serde_yaml::Value = serde_yaml::from_str("auth:\n  api_token: one\n").unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str("auth:\n  api_token: two\n").unwrap();

        merge_values(&mut base, overlay);
        assert_eq!(base["auth"]["api_token"], "two");
    }

    #[test]
    fn test_remote_path() {
        let settings = Settings::default();
        assert_eq!(settings.remote_path("recordings"), "gdrive:recordings");
    }

    #[test]
    fn test_recording_dirs_order() {
        let mut settings = Settings::default();
        settings.paths.legacy_recordings = vec![PathBuf::from("/old/live")];

        let dirs = settings.recording_dirs();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0], settings.paths.recordings);
        assert_eq!(dirs[1], PathBuf::from("/old/live"));
    }
}
