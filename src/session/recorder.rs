//! Live capture supervision: start, liveness detection, the escalating stop
//! sequence, and post-stop artifact archival.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::{RecordingProcess, SessionId, SessionRegistry};
use crate::config::Settings;
use crate::remote::{self, RcloneTransport};
use crate::utils::{format_file_size, newest_file_in};
use crate::{media, Result, StreamVaultError};

#[cfg(unix)]
use libc::{SIGINT, SIGTERM};
#[cfg(not(unix))]
const SIGINT: i32 = 2;
#[cfg(not(unix))]
const SIGTERM: i32 = 15;

/// How a start request was routed.
#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A capture process is now recording for this session.
    CaptureStarted,
    /// The source is a finished file; the caller should run a download job.
    NotLive,
}

/// What came out of a stop sequence.
#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// No qualifying capture artifact was found in any candidate directory.
    NothingToUpload,
    /// The artifact was normalized, synced, and removed locally.
    Uploaded { remote_folder: String, file_name: String },
}

/// Supervises at most one capture process per session.
pub struct LiveRecorder {
    settings: Settings,
    registry: std::sync::Arc<SessionRegistry>,
}

impl LiveRecorder {
    pub fn new(settings: Settings, registry: std::sync::Arc<SessionRegistry>) -> Self {
        Self { settings, registry }
    }

    /// Start capturing `url` for `session`.
    ///
    /// Liveness is recomputed from scratch on every call: a probe of the
    /// source metadata OR a URL shape match. Nothing is carried over from
    /// earlier calls. A non-live source is handed back for a plain download
    /// job; a session already recording is a conflict.
    pub async fn start(&self, session: SessionId, url: &str) -> Result<StartOutcome> {
        let url = crate::utils::validate_and_normalize_url(url)?;

        let live = probe_live(&url).await || looks_like_live_url(&url);
        if !live {
            return Ok(StartOutcome::NotLive);
        }

        let recordings = self.settings.paths.recordings.clone();
        fs_err::create_dir_all(&recordings)?;

        self.registry
            .start_recording(session, || spawn_capture(&url, &recordings))?;

        tracing::info!("Capture started for session {} from {}", session, url);
        Ok(StartOutcome::CaptureStarted)
    }

    /// Stop the session's capture and archive what it produced.
    ///
    /// The stop flag is exclusive; a second concurrent stop is rejected.
    /// Process shutdown is best-effort (interrupt, then terminate, then
    /// kill) and the artifact scan runs regardless, because the capture
    /// process may already have exited on its own.
    pub async fn stop(&self, session: SessionId) -> Result<StopOutcome> {
        let _stop = self.registry.begin_stop(session)?;

        if let Some(process) = self.registry.take_recording(session) {
            let elapsed = process.started_at.elapsed();
            tracing::info!(
                "Stopping capture for session {} after {}",
                session,
                crate::utils::format_duration(elapsed.as_secs_f64())
            );
            shutdown_capture(
                process,
                Duration::from_secs(self.settings.recording.stop_timeout_secs),
            )
            .await;
        }

        let artifact = match scan_artifact(
            &self.settings.recording_dirs(),
            self.settings.recording.min_upload_bytes,
        ) {
            Some(path) => path,
            None => {
                tracing::info!("Session {}: nothing to upload", session);
                return Ok(StopOutcome::NothingToUpload);
            }
        };

        let size = std::fs::metadata(&artifact).map(|meta| meta.len()).unwrap_or(0);
        tracing::info!(
            "Archiving {} ({})",
            artifact.display(),
            format_file_size(size)
        );

        let normalized = media::normalize_faststart(&artifact)
            .await
            .context("container normalization failed")?;

        let remote_folder = self
            .settings
            .remote_path(&self.settings.remote.recording_folder);
        let transport = RcloneTransport::new();

        match remote::upload(&transport, &normalized, &remote_folder).await {
            Ok(()) => {
                let file_name = normalized
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                // Local copies go only after the sync is confirmed
                remove_local(&normalized);
                remove_local(&artifact);
                Ok(StopOutcome::Uploaded {
                    remote_folder,
                    file_name,
                })
            }
            Err(err) => {
                tracing::error!(
                    "Upload failed, keeping {} for a manual retry",
                    artifact.display()
                );
                Err(err.context("upload after stop failed"))
            }
        }
    }

    pub fn is_recording(&self, session: SessionId) -> bool {
        self.registry.is_recording(session)
    }
}

/// Ask the acquisition tool whether the source is currently live.
///
/// Probe failures count as "not live" so the URL-shape signal still gets its
/// vote; the two signals are OR-ed fresh by the caller.
pub async fn probe_live(url: &str) -> bool {
    let output = Command::new("yt-dlp")
        .args([
            "--dump-json",
            "--no-playlist",
            "--extractor-args",
            crate::acquire::YOUTUBE_EXTRACTOR_ARGS,
            url,
        ])
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        _ => return false,
    };

    serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .ok()
        .and_then(|info| info["is_live"].as_bool())
        .unwrap_or(false)
}

/// URL shapes that indicate a live stream without probing.
pub fn looks_like_live_url(url: &str) -> bool {
    let lowered = url.to_lowercase();
    ["youtube.com/live", "youtu.be", "live.youtube.com"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Most recent file of at least `min_bytes` across the candidate capture
/// directories. Small files are truncated partial captures, not artifacts.
pub fn scan_artifact(dirs: &[PathBuf], min_bytes: u64) -> Option<PathBuf> {
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    for dir in dirs {
        if let Some(path) = newest_file_in(dir, min_bytes) {
            let modified = std::fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            if best.as_ref().map_or(true, |(seen, _)| modified > *seen) {
                best = Some((modified, path));
            }
        }
    }

    best.map(|(_, path)| path)
}

/// Spawn the long-running capture process writing into `recordings`.
fn spawn_capture(url: &str, recordings: &Path) -> Result<RecordingProcess> {
    let stamp = chrono::Local::now().format("%y%m%d_%H%M%S");
    let template = recordings
        .join(format!("{}_%(title).80B.mp4", stamp))
        .to_string_lossy()
        .to_string();

    let child = Command::new("yt-dlp")
        .args([
            url,
            "-o",
            template.as_str(),
            "--no-playlist",
            "--no-progress",
            "--extractor-args",
            crate::acquire::YOUTUBE_EXTRACTOR_ARGS,
            "-f",
            "best",
        ])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                anyhow::Error::from(StreamVaultError::ToolUnavailable("yt-dlp".to_string()))
            }
            _ => anyhow::Error::from(err).context("failed to spawn the capture process"),
        })?;

    Ok(RecordingProcess {
        child,
        started_at: Instant::now(),
        source: url.to_string(),
    })
}

/// Interrupt, then terminate, then kill. Every step is best-effort; the
/// caller scans for artifacts no matter how shutdown went.
async fn shutdown_capture(mut process: RecordingProcess, grace: Duration) {
    send_signal(&process.child, SIGINT);
    if wait_with_timeout(&mut process.child, grace).await {
        return;
    }

    tracing::warn!("Capture ignored the interrupt, terminating");
    send_signal(&process.child, SIGTERM);
    if wait_with_timeout(&mut process.child, Duration::from_secs(5)).await {
        return;
    }

    tracing::warn!("Capture ignored the terminate, killing");
    if let Err(err) = process.child.kill().await {
        tracing::warn!("Forced kill failed: {}", err);
    }
}

#[cfg(unix)]
fn send_signal(child: &tokio::process::Child, signal: i32) {
    if let Some(pid) = child.id() {
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if rc != 0 {
            tracing::warn!("Could not deliver signal {} to pid {}", signal, pid);
        }
    }
}

#[cfg(not(unix))]
fn send_signal(_child: &tokio::process::Child, _signal: i32) {}

/// Wait for exit up to `limit`. A wait error counts as exited, since no
/// further signalling can help at that point.
async fn wait_with_timeout(child: &mut tokio::process::Child, limit: Duration) -> bool {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("Capture exited with {}", status);
            true
        }
        Ok(Err(err)) => {
            tracing::warn!("Waiting on the capture process failed: {}", err);
            true
        }
        Err(_) => false,
    }
}

fn remove_local(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!("Could not remove {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder_with_empty_dirs(dir: &Path) -> LiveRecorder {
        let mut settings = Settings::default();
        settings.paths.recordings = dir.to_path_buf();
        settings.paths.legacy_recordings = vec![dir.join("older")];
        LiveRecorder::new(settings, Arc::new(SessionRegistry::new()))
    }

    #[test]
    fn test_live_url_patterns() {
        assert!(looks_like_live_url("https://www.youtube.com/live/abc123"));
        assert!(looks_like_live_url("https://YOUTU.BE/abc123"));
        assert!(!looks_like_live_url("https://www.youtube.com/watch?v=abc123"));
        assert!(!looks_like_live_url("https://example.com/video.mp4"));
    }

    #[test]
    fn test_scan_rejects_small_and_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf(), legacy.path().to_path_buf()];

        // truncated partial capture, below the threshold
        std::fs::write(dir.path().join("partial.mp4"), vec![0u8; 100]).unwrap();
        assert_eq!(scan_artifact(&dirs, 1024), None);

        std::fs::write(legacy.path().join("old.mp4"), vec![0u8; 4096]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("new.mp4"), vec![0u8; 4096]).unwrap();

        let found = scan_artifact(&dirs, 1024).unwrap();
        assert_eq!(found.file_name().unwrap(), "new.mp4");
    }

    #[tokio::test]
    async fn test_stop_without_process_or_artifact_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_with_empty_dirs(dir.path());

        let outcome = recorder.stop(42).await.unwrap();
        assert_eq!(outcome, StopOutcome::NothingToUpload);
    }

    #[tokio::test]
    async fn test_concurrent_stop_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder_with_empty_dirs(dir.path());

        let held = recorder.registry.begin_stop(42).unwrap();
        let err = recorder.stop(42).await.unwrap_err();
        assert!(err.to_string().contains("stop already in progress"));

        drop(held);
        assert_eq!(recorder.stop(42).await.unwrap(), StopOutcome::NothingToUpload);
    }
}
