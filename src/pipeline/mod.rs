//! The per-job stage sequence: acquire, sync, then optional transcription
//! and summarization.
//!
//! One job per session, never queued. Each job owns an ephemeral workspace
//! that is removed on every exit path, and every stage failure names the
//! stage in the single message that reaches the user.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::media::TimeRange;
use crate::remote::{self, RcloneTransport};
use crate::session::{recorder, JobGuard, SessionId, SessionRegistry};
use crate::summarize;
use crate::transcribe::TranscriptionClient;
use crate::{acquire, media, Result};

/// Where a job currently is in its stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Downloading,
    Uploading,
    Transcribing,
    Summarizing,
    Idle,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Downloading => "downloading",
            JobStatus::Uploading => "uploading",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Summarizing => "summarizing",
            JobStatus::Idle => "idle",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Caller intent for one job.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Optional clip boundaries applied to the downloaded file.
    pub range: Option<TimeRange>,

    /// Produce a transcript after archival.
    pub transcribe: bool,

    /// Summarize the transcript (implies nothing unless `transcribe`).
    pub summarize: bool,
}

/// What a finished job produced.
#[derive(Debug)]
pub struct JobReport {
    pub source: String,
    pub uploaded_to: String,
    pub transcript: Option<std::path::PathBuf>,
    pub summary: Option<std::path::PathBuf>,
}

/// Runs download jobs for sessions.
pub struct Pipeline {
    settings: Settings,
    registry: Arc<SessionRegistry>,
}

impl Pipeline {
    pub fn new(settings: Settings, registry: Arc<SessionRegistry>) -> Self {
        Self { settings, registry }
    }

    /// Stages that actually run for this job. Live content routes to the
    /// capture supervisor, so transcription and summarization are forced off
    /// regardless of what the caller asked for.
    pub fn effective_stages(live: bool, options: &JobOptions) -> (bool, bool) {
        if live {
            (false, false)
        } else {
            (options.transcribe, options.summarize && options.transcribe)
        }
    }

    /// Run one job to completion.
    ///
    /// The job slot is claimed up front and released when this returns, on
    /// every path. The workspace lives exactly as long as the job.
    pub async fn run(
        &self,
        session: SessionId,
        url: &str,
        options: JobOptions,
    ) -> Result<JobReport> {
        let url = crate::utils::validate_and_normalize_url(url)?;
        let guard = self.registry.begin_job(session, &url)?;

        let live = recorder::probe_live(&url).await || recorder::looks_like_live_url(&url);
        let (transcribe, summarize) = Self::effective_stages(live, &options);

        let workspace =
            tempfile::TempDir::new().context("failed to create the job workspace")?;

        let result = self
            .run_stages(
                &guard,
                &url,
                options.range,
                transcribe,
                summarize,
                workspace.path(),
            )
            .await;

        if result.is_err() {
            guard.set_status(JobStatus::Failed);
        }
        result
    }

    /// Run a job on a background task so the command surface stays
    /// responsive. Failures are caught here, at the job boundary, and only
    /// logged; they never unwind into the caller.
    pub fn spawn(
        self: Arc<Self>,
        session: SessionId,
        url: String,
        options: JobOptions,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match self.run(session, &url, options).await {
                Ok(report) => {
                    tracing::info!(
                        "Job for session {} done: {} -> {}",
                        session,
                        report.source,
                        report.uploaded_to
                    );
                }
                Err(err) => {
                    tracing::error!("Job for session {} failed: {:#}", session, err);
                }
            }
        })
    }

    async fn run_stages(
        &self,
        guard: &JobGuard,
        url: &str,
        range: Option<TimeRange>,
        want_transcribe: bool,
        want_summary: bool,
        workspace: &Path,
    ) -> Result<JobReport> {
        guard.set_status(JobStatus::Downloading);
        let downloaded = acquire::acquire(url, workspace)
            .await
            .context("download stage failed")?;

        let artifact = match range {
            Some(range) => {
                let stem = downloaded
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "download".to_string());
                let clipped = workspace.join(format!("{}_clip.mp4", stem));
                media::clip(&downloaded, &clipped, &range)
                    .await
                    .context("clip stage failed")?
            }
            None => downloaded,
        };

        guard.set_status(JobStatus::Uploading);
        let remote_folder = self
            .settings
            .remote_path(&self.settings.remote.download_folder);
        let transport = RcloneTransport::new();
        remote::upload(&transport, &artifact, &remote_folder)
            .await
            .context("upload stage failed")?;

        let mut report = JobReport {
            source: url.to_string(),
            uploaded_to: remote_folder,
            transcript: None,
            summary: None,
        };

        if !want_transcribe {
            // Nothing downstream needs the local copy anymore
            if let Err(err) = std::fs::remove_file(&artifact) {
                tracing::warn!("Could not remove {}: {}", artifact.display(), err);
            }
            return Ok(report);
        }

        guard.set_status(JobStatus::Transcribing);
        let client = TranscriptionClient::new(&self.settings);
        let transcript = client
            .transcribe(&artifact, &self.settings.paths.transcripts)
            .await
            .context("transcription stage failed")?;
        report.transcript = Some(transcript.clone());

        if want_summary {
            guard.set_status(JobStatus::Summarizing);
            let summarizer = summarize::create_summarizer(&self.settings);
            let summary = summarize::summarize_to_file(
                summarizer.as_ref(),
                &transcript,
                &self.settings.paths.summaries,
                self.settings.summary.max_chars,
            )
            .await
            .context("summarization stage failed")?;
            report.summary = Some(summary);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_forces_analysis_stages_off() {
        let options = JobOptions {
            range: None,
            transcribe: true,
            summarize: true,
        };

        assert_eq!(Pipeline::effective_stages(true, &options), (false, false));
        assert_eq!(Pipeline::effective_stages(false, &options), (true, true));
    }

    #[test]
    fn test_summarize_requires_transcribe() {
        let options = JobOptions {
            range: None,
            transcribe: false,
            summarize: true,
        };

        assert_eq!(Pipeline::effective_stages(false, &options), (false, false));
    }

    #[tokio::test]
    async fn test_busy_session_is_rejected_before_any_stage() {
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = Pipeline::new(Settings::default(), Arc::clone(&registry));

        let _held = registry.begin_job(9, "https://example.com/v").unwrap();
        let err = pipeline
            .run(9, "https://example.com/other", JobOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("already running"));
        // the busy slot is untouched by the rejected request
        assert!(registry.job_status(9).is_some());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(JobStatus::Downloading.to_string(), "downloading");
        assert_eq!(JobStatus::Idle.to_string(), "idle");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
