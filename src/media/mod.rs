//! ffmpeg-backed media operations: clip extraction, container normalization
//! and single-frame capture from live streams.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::utils::ffmpeg_binary;
use crate::{Result, StreamVaultError};

pub mod range;

pub use range::{format_clock, parse_range, TimeRange};

/// Extract `range` from `src` into `dst`.
///
/// A stream copy is tried first; when the container defeats copy-seeking, a
/// deterministic re-encode runs instead. Neither attempt leaves a partial
/// output behind on failure.
pub async fn clip(src: &Path, dst: &Path, range: &TimeRange) -> Result<PathBuf> {
    let attempts = [
        stream_copy_args(src, dst, range),
        reencode_args(src, dst, range),
    ];

    let mut last_error = String::new();
    for args in &attempts {
        match run_ffmpeg(args).await {
            Ok(()) if is_nonempty_file(dst) => return Ok(dst.to_path_buf()),
            Ok(()) => last_error = "clip produced an empty file".to_string(),
            Err(err) => last_error = format!("{:#}", err),
        }
        remove_partial(dst);
    }

    Err(StreamVaultError::ToolFailed {
        tool: "ffmpeg".to_string(),
        detail: last_error,
    }
    .into())
}

/// Remux `src` into a faststart MP4 next to the original, returning the new
/// path. Players and remote previews need the moov atom up front.
pub async fn normalize_faststart(src: &Path) -> Result<PathBuf> {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "capture".to_string());
    let dst = src.with_file_name(format!("{}_faststart.mp4", stem));

    let args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        src.to_string_lossy().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        dst.to_string_lossy().to_string(),
    ];

    run_ffmpeg(&args).await?;
    if !is_nonempty_file(&dst) {
        remove_partial(&dst);
        return Err(StreamVaultError::EmptyResult(format!(
            "normalized container {}",
            dst.display()
        ))
        .into());
    }

    Ok(dst)
}

/// Capture a single frame from a live stream into `dest_dir`.
///
/// The direct stream URL is resolved first with yt-dlp, then ffmpeg grabs a
/// frame one second in.
pub async fn capture_frame(url: &str, dest_dir: &Path) -> Result<PathBuf> {
    fs_err::create_dir_all(dest_dir)?;

    let output = Command::new("yt-dlp")
        .args([
            "-g",
            "-f",
            "best",
            "--extractor-args",
            crate::acquire::YOUTUBE_EXTRACTOR_ARGS,
            url,
        ])
        .output()
        .await
        .map_err(|_| StreamVaultError::ToolUnavailable("yt-dlp".to_string()))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("could not resolve the stream URL: {}", error.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stream_url = stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| StreamVaultError::EmptyResult("stream URL from yt-dlp".to_string()))?
        .to_string();

    let dst = unique_capture_path(dest_dir);
    let args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        "00:00:01".to_string(),
        "-i".to_string(),
        stream_url,
        "-frames:v".to_string(),
        "1".to_string(),
        dst.to_string_lossy().to_string(),
    ];

    run_ffmpeg(&args).await.context("frame capture failed")?;
    if !is_nonempty_file(&dst) {
        remove_partial(&dst);
        return Err(StreamVaultError::EmptyResult(format!("capture {}", dst.display())).into());
    }

    Ok(dst)
}

/// Seek-and-copy extraction: cheap, but fails near some container boundaries.
fn stream_copy_args(src: &Path, dst: &Path, range: &TimeRange) -> Vec<String> {
    let mut args = seek_args(src, range);
    args.extend(["-c".to_string(), "copy".to_string()]);
    args.push(dst.to_string_lossy().to_string());
    args
}

/// Full re-encode with fixed codec and quality settings; slow but tolerant
/// of the seek edge cases that defeat stream copy.
fn reencode_args(src: &Path, dst: &Path, range: &TimeRange) -> Vec<String> {
    let mut args = seek_args(src, range);
    args.extend(
        [
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-movflags",
            "+faststart",
        ]
        .map(String::from),
    );
    args.push(dst.to_string_lossy().to_string());
    args
}

fn seek_args(src: &Path, range: &TimeRange) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{}", range.start),
        "-i".to_string(),
        src.to_string_lossy().to_string(),
    ];
    if let Some(duration) = range.duration() {
        args.push("-t".to_string());
        args.push(format!("{}", duration));
    }
    args
}

async fn run_ffmpeg(args: &[String]) -> Result<()> {
    let binary = ffmpeg_binary();
    let output = Command::new(&binary)
        .args(args)
        .output()
        .await
        .map_err(|_| StreamVaultError::ToolUnavailable("ffmpeg".to_string()))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        return Err(StreamVaultError::ToolFailed {
            tool: "ffmpeg".to_string(),
            detail: error.trim().to_string(),
        }
        .into());
    }

    Ok(())
}

fn unique_capture_path(dest_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%y%m%d_%H%M%S").to_string();
    let mut path = dest_dir.join(format!("{}.png", stamp));
    let mut suffix = 1;
    while path.exists() {
        path = dest_dir.join(format!("{}_{}.png", stamp, suffix));
        suffix += 1;
    }
    path
}

fn is_nonempty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove partial output {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_args_bounded() {
        let range = TimeRange { start: 5.0, end: Some(10.0) };
        let args = stream_copy_args(Path::new("in.mp4"), Path::new("out.mp4"), &range);

        let rendered = args.join(" ");
        assert!(rendered.contains("-ss 5"));
        assert!(rendered.contains("-t 5"));
        assert!(rendered.contains("-c copy"));
        assert!(rendered.ends_with("out.mp4"));
    }

    #[test]
    fn test_stream_copy_args_to_end() {
        let range = TimeRange { start: 600.0, end: None };
        let args = stream_copy_args(Path::new("in.mp4"), Path::new("out.mp4"), &range);

        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn test_reencode_args_fixed_codecs() {
        let range = TimeRange { start: 0.0, end: Some(30.0) };
        let args = reencode_args(Path::new("in.mp4"), Path::new("out.mp4"), &range);

        let rendered = args.join(" ");
        assert!(rendered.contains("-c:v libx264"));
        assert!(rendered.contains("-crf 23"));
        assert!(rendered.contains("-c:a aac"));
        assert!(!rendered.contains("-c copy"));
    }

    #[test]
    fn test_unique_capture_path_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_capture_path(dir.path());
        std::fs::write(&first, b"png").unwrap();

        let second = unique_capture_path(dir.path());
        assert_ne!(first, second);
    }
}
