//! StreamVault - capture, archive, clip, transcribe and summarize online video
//!
//! This library supervises long-running capture processes per session, runs an
//! acquire -> sync -> transcribe -> summarize pipeline with per-stage fallback,
//! resolves human time-range expressions into clip boundaries, and hands out
//! short-lived opaque tokens for size-limited callback payloads.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod summarize;
pub mod token;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Settings;
pub use media::TimeRange;
pub use pipeline::{JobOptions, JobReport, JobStatus, Pipeline};
pub use session::{LiveRecorder, SessionId, SessionRegistry, StartOutcome, StopOutcome};
pub use token::{TokenKind, TokenStore};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the orchestrator
#[derive(thiserror::Error, Debug)]
pub enum StreamVaultError {
    #[error("{0} is not available on this system")]
    ToolUnavailable(String),

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("Expected output missing or empty: {0}")]
    EmptyResult(String),

    #[error("Transient remote-store race: {0}")]
    RemoteRace(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Session busy: {0}")]
    Conflict(String),

    #[error("Selection expired, please reopen the menu")]
    ExpiredReference,
}
