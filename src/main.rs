use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamvault::remote::{self, RcloneTransport};
use streamvault::session::{LiveRecorder, SessionRegistry, StartOutcome, StopOutcome};
use streamvault::summarize;
use streamvault::transcribe::TranscriptionClient;
use streamvault::{acquire, media, Cli, Commands, JobOptions, Pipeline, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamvault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Check for required external dependencies (non-fatal)
    let missing_deps = streamvault::utils::check_dependencies().await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    let settings = Settings::load()?;
    let registry = Arc::new(SessionRegistry::new());

    match cli.command {
        Commands::Record { url, session } => {
            let recorder = LiveRecorder::new(settings.clone(), Arc::clone(&registry));

            match recorder.start(session, &url).await? {
                StartOutcome::CaptureStarted => {
                    println!("Recording... press Ctrl-C to stop and archive.");
                    tokio::signal::ctrl_c().await?;

                    let progress = spinner("Stopping capture and archiving...");
                    let outcome = recorder.stop(session).await;
                    progress.finish_and_clear();

                    match outcome? {
                        StopOutcome::Uploaded {
                            remote_folder,
                            file_name,
                        } => println!("Uploaded {} to {}", file_name, remote_folder),
                        StopOutcome::NothingToUpload => {
                            println!("Nothing to upload - no capture reached the size threshold.")
                        }
                    }
                }
                StartOutcome::NotLive => {
                    println!("Source is not live, downloading it as a regular job instead.");
                    let pipeline = Pipeline::new(settings, registry);
                    let report = pipeline.run(session, &url, JobOptions::default()).await?;
                    println!("Archived {} to {}", report.source, report.uploaded_to);
                }
            }
        }

        Commands::Process {
            url,
            range,
            transcribe,
            summarize,
            session,
        } => {
            let range = range.as_deref().map(media::parse_range).transpose()?;
            let options = JobOptions {
                range,
                transcribe,
                summarize,
            };

            let pipeline = Pipeline::new(settings, registry);
            let report = pipeline.run(session, &url, options).await?;

            println!("Archived {} to {}", report.source, report.uploaded_to);
            if let Some(transcript) = report.transcript {
                println!("Transcript: {}", transcript.display());
            }
            if let Some(summary) = report.summary {
                println!("Summary: {}", summary.display());
            }
        }

        Commands::Download { url, output } => {
            let dest = output.unwrap_or_else(|| settings.paths.downloads.clone());

            let progress = spinner("Downloading...");
            let result = acquire::acquire(&url, &dest).await;
            progress.finish_and_clear();

            println!("Downloaded: {}", result?.display());
        }

        Commands::Clip {
            input,
            range,
            output,
        } => {
            let range = media::parse_range(&range)?;
            let clipped = media::clip(&input, &output, &range).await?;
            println!("Clip saved to {}", clipped.display());
        }

        Commands::Upload { file, folder } => {
            let folder = folder.unwrap_or_else(|| settings.remote.download_folder.clone());
            let remote_folder = settings.remote_path(&folder);
            let transport = RcloneTransport::new();

            let progress = spinner("Uploading...");
            let result = remote::upload(&transport, &file, &remote_folder).await;
            progress.finish_and_clear();

            result?;
            println!("Uploaded {} to {}", file.display(), remote_folder);
        }

        Commands::Snapshot { url } => {
            let frame = media::capture_frame(&url, &settings.paths.captures).await?;
            println!("Frame saved to {}", frame.display());
        }

        Commands::Transcribe { file } => {
            let client = TranscriptionClient::new(&settings);

            let progress = spinner("Transcribing...");
            let result = client.transcribe(&file, &settings.paths.transcripts).await;
            progress.finish_and_clear();

            println!("Transcript saved to {}", result?.display());
        }

        Commands::Summarize { file } => {
            let summarizer = summarize::create_summarizer(&settings);

            let progress = spinner("Summarizing...");
            let result = summarize::summarize_to_file(
                summarizer.as_ref(),
                &file,
                &settings.paths.summaries,
                settings.summary.max_chars,
            )
            .await;
            progress.finish_and_clear();

            println!("Summary saved to {}", result?.display());
        }

        Commands::Config { show } => {
            if show {
                settings.display();
            } else {
                settings.save()?;
                println!("Settings written to the user override file.");
            }
        }
    }

    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}
