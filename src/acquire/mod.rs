//! Source acquisition through yt-dlp with graceful quality degradation.
//!
//! Two format profiles are tried in order: the best split audio/video
//! streams (needs ffmpeg to mux), then a progressive single stream that
//! saves without any post-processing. The second profile is always kept as
//! the terminal fallback so a missing ffmpeg degrades quality instead of
//! failing the download.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::utils::{self, ffmpeg_binary, newest_file_in};
use crate::{Result, StreamVaultError};

/// Extractor tuning shared by every yt-dlp invocation.
pub const YOUTUBE_EXTRACTOR_ARGS: &str = "youtube:player_client=android";

/// Output template for link downloads.
const OUTPUT_TEMPLATE: &str = "%(title).80B.mp4";

/// An ordered acquisition strategy trading dependency requirements against
/// output quality.
#[derive(Debug)]
pub struct FormatProfile {
    pub name: &'static str,
    pub selector: &'static str,
    pub requires_mux: bool,
}

/// Highest quality first; the progressive profile never needs the mux tool.
pub const PROFILES: [FormatProfile; 2] = [
    FormatProfile {
        name: "split-av",
        selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
        requires_mux: true,
    },
    FormatProfile {
        name: "progressive",
        selector: "best[ext=mp4][acodec!=none][vcodec!=none]/best[acodec!=none]",
        requires_mux: false,
    },
];

/// Profiles worth attempting given the mux tool's availability.
pub fn eligible_profiles(mux_available: bool) -> Vec<&'static FormatProfile> {
    PROFILES
        .iter()
        .filter(|profile| mux_available || !profile.requires_mux)
        .collect()
}

/// yt-dlp arguments for one profile attempt.
pub fn build_args(
    profile: &FormatProfile,
    url: &str,
    dest_dir: &Path,
    ffmpeg_location: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        url.to_string(),
        "-o".to_string(),
        dest_dir.join(OUTPUT_TEMPLATE).to_string_lossy().to_string(),
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--extractor-args".to_string(),
        YOUTUBE_EXTRACTOR_ARGS.to_string(),
        "-f".to_string(),
        profile.selector.to_string(),
    ];

    if profile.requires_mux {
        if let Some(location) = ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().to_string());
        }
        args.extend(
            [
                "--remux-video",
                "mp4",
                "--postprocessor-args",
                "-c:v copy -c:a copy",
            ]
            .map(String::from),
        );
    }

    args
}

/// Acquire `url` into `dest_dir`, returning the downloaded file.
///
/// The first clean attempt wins; after all profiles fail, the last tool
/// diagnostic is surfaced.
pub async fn acquire(url: &str, dest_dir: &Path) -> Result<PathBuf> {
    let url = utils::validate_and_normalize_url(url)?;
    fs_err::create_dir_all(dest_dir)?;

    let mux_available = utils::check_command_available(&ffmpeg_binary().to_string_lossy()).await;
    let ffmpeg_location = ffmpeg_override();

    let mut last_error = String::new();
    for profile in eligible_profiles(mux_available) {
        tracing::info!("Downloading with profile {}", profile.name);

        let args = build_args(profile, &url, dest_dir, ffmpeg_location.as_deref());
        let output = Command::new("yt-dlp")
            .args(&args)
            .output()
            .await
            .map_err(|_| StreamVaultError::ToolUnavailable("yt-dlp".to_string()))?;

        if output.status.success() {
            if let Some(path) = newest_file_in(dest_dir, 1) {
                tracing::info!("Download complete: {}", path.display());
                return Ok(path);
            }
            last_error = "download reported success but produced no file".to_string();
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            last_error = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            tracing::warn!("Profile {} failed: {}", profile.name, last_error);
        }
    }

    Err(StreamVaultError::ToolFailed {
        tool: "yt-dlp".to_string(),
        detail: last_error,
    }
    .into())
}

/// Explicit ffmpeg location, only when the environment overrides the PATH
/// lookup.
fn ffmpeg_override() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var("FFMPEG_PATH").ok()?);
    path.exists().then_some(path)
}
