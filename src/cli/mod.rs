use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "streamvault",
    about = "StreamVault - capture live streams, archive downloads, clip, transcribe and summarize",
    version,
    long_about = "A toolkit for archiving online video: supervise live-stream captures, \
download finished videos with graceful quality fallback, extract clips, sync artifacts \
to a remote store, and run transcription and summarization over the results."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a live stream until Ctrl-C, then archive the capture
    Record {
        /// Live stream URL
        #[arg(value_name = "URL")]
        url: String,

        /// Session to book the capture under
        #[arg(long, default_value = "0")]
        session: i64,
    },

    /// Download a video, archive it, and optionally transcribe and summarize
    Process {
        /// Video URL
        #[arg(value_name = "URL")]
        url: String,

        /// Clip range to extract, e.g. "00:05:00~00:12:30", "10:00~" or "all"
        #[arg(long, value_name = "RANGE")]
        range: Option<String>,

        /// Produce a transcript after archival
        #[arg(long)]
        transcribe: bool,

        /// Summarize the transcript (needs --transcribe)
        #[arg(long)]
        summarize: bool,

        /// Session to book the job under
        #[arg(long, default_value = "0")]
        session: i64,
    },

    /// Download a video into a local directory
    Download {
        /// Video URL
        #[arg(value_name = "URL")]
        url: String,

        /// Destination directory (defaults to the configured downloads path)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Extract a time range from a local media file
    Clip {
        /// Source media file
        input: PathBuf,

        /// Range expression, e.g. "00:05:00~00:12:30"
        range: String,

        /// Output file
        output: PathBuf,
    },

    /// Upload a local file to the remote store
    Upload {
        /// File to upload
        file: PathBuf,

        /// Remote folder (defaults to the configured download folder)
        #[arg(long, value_name = "FOLDER")]
        folder: Option<String>,
    },

    /// Capture a single frame from a live stream
    Snapshot {
        /// Live stream URL
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Transcribe a local media file
    Transcribe {
        /// Media file to transcribe
        file: PathBuf,
    },

    /// Summarize a transcript file
    Summarize {
        /// Transcript file to summarize
        file: PathBuf,
    },

    /// Show or persist configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
