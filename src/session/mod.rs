//! Per-session state: the capture process, the active pipeline job, and the
//! stop lock.
//!
//! One registry guards all of it behind a single mutex. The lock is only
//! ever held for map access, never across an await point; long-running work
//! takes ownership of what it needs (the child handle) and operates outside
//! the lock. Slots are released through Drop guards so every exit path,
//! including panics inside a stage, gives the session back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::pipeline::JobStatus;
use crate::{Result, StreamVaultError};

pub mod recorder;

pub use recorder::{LiveRecorder, StartOutcome, StopOutcome};

/// Addressable conversation/context id.
pub type SessionId = i64;

/// An owned external capture process.
pub struct RecordingProcess {
    pub child: tokio::process::Child,
    pub started_at: Instant,
    pub source: String,
}

#[derive(Default)]
struct SessionState {
    recording: Option<RecordingProcess>,
    stopping: bool,
    job: Option<JobSlot>,
}

struct JobSlot {
    status: JobStatus,
    source: String,
    created_at: Instant,
}

/// Shared registry of every session's mutable state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self, session: SessionId) -> bool {
        let sessions = self.lock();
        sessions
            .get(&session)
            .map(|state| state.recording.is_some())
            .unwrap_or(false)
    }

    /// Store a capture process for `session`, spawning it under the registry
    /// lock so two concurrent starts cannot both slip past the busy check.
    pub fn start_recording<F>(&self, session: SessionId, spawn: F) -> Result<()>
    where
        F: FnOnce() -> Result<RecordingProcess>,
    {
        let mut sessions = self.lock();
        let state = sessions.entry(session).or_default();
        if state.recording.is_some() {
            return Err(
                StreamVaultError::Conflict("a recording is already running".to_string()).into(),
            );
        }
        state.recording = Some(spawn()?);
        Ok(())
    }

    /// Take ownership of the session's capture process, if any.
    pub fn take_recording(&self, session: SessionId) -> Option<RecordingProcess> {
        let mut sessions = self.lock();
        sessions
            .get_mut(&session)
            .and_then(|state| state.recording.take())
    }

    /// Claim the exclusive stop flag. The returned guard releases it on drop,
    /// whatever path the stop sequence exits through.
    pub fn begin_stop(self: &Arc<Self>, session: SessionId) -> Result<StopGuard> {
        let mut sessions = self.lock();
        let state = sessions.entry(session).or_default();
        if state.stopping {
            return Err(StreamVaultError::Conflict("stop already in progress".to_string()).into());
        }
        state.stopping = true;
        Ok(StopGuard {
            registry: Arc::clone(self),
            session,
        })
    }

    /// Claim the single job slot for `session`. Rejected, never queued.
    pub fn begin_job(self: &Arc<Self>, session: SessionId, source: &str) -> Result<JobGuard> {
        let mut sessions = self.lock();
        let state = sessions.entry(session).or_default();
        if state.job.is_some() {
            return Err(
                StreamVaultError::Conflict("a job is already running for this session".to_string())
                    .into(),
            );
        }
        state.job = Some(JobSlot {
            status: JobStatus::Downloading,
            source: source.to_string(),
            created_at: Instant::now(),
        });
        Ok(JobGuard {
            registry: Arc::clone(self),
            session,
        })
    }

    /// Current job status for the status surface.
    pub fn job_status(&self, session: SessionId) -> Option<(JobStatus, String)> {
        let sessions = self.lock();
        sessions.get(&session).and_then(|state| {
            state
                .job
                .as_ref()
                .map(|job| (job.status, job.source.clone()))
        })
    }

    /// Age of the active job, if any.
    pub fn job_age(&self, session: SessionId) -> Option<std::time::Duration> {
        let sessions = self.lock();
        sessions
            .get(&session)
            .and_then(|state| state.job.as_ref().map(|job| job.created_at.elapsed()))
    }

    fn set_job_status(&self, session: SessionId, status: JobStatus) {
        let mut sessions = self.lock();
        if let Some(job) = sessions.get_mut(&session).and_then(|state| state.job.as_mut()) {
            job.status = status;
        }
    }

    fn end_stop(&self, session: SessionId) {
        let mut sessions = self.lock();
        if let Some(state) = sessions.get_mut(&session) {
            state.stopping = false;
        }
    }

    fn clear_job(&self, session: SessionId) {
        let mut sessions = self.lock();
        if let Some(state) = sessions.get_mut(&session) {
            state.job = None;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionState>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive hold on a session's stop sequence.
pub struct StopGuard {
    registry: Arc<SessionRegistry>,
    session: SessionId,
}

impl std::fmt::Debug for StopGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopGuard")
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.registry.end_stop(self.session);
    }
}

/// Exclusive hold on a session's job slot; the slot is cleared to idle when
/// the guard drops.
pub struct JobGuard {
    registry: Arc<SessionRegistry>,
    session: SessionId,
}

impl JobGuard {
    pub fn set_status(&self, status: JobStatus) {
        self.registry.set_job_status(self.session, status);
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.clear_job(self.session);
    }
}
