//! Layered-retry archival to the remote store.
//!
//! The remote store shows transient races right after folder creation: a
//! just-created directory can be missing from listings for a short window,
//! surfacing as "not found" during a copy. A single fixed retry strategy
//! does not converge on that class, so the strategy itself escalates across
//! attempts: careful direct copy, then a re-asserted folder with a patient
//! smaller-chunk copy, then a directory-target copy where the tool decides
//! the final name.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use crate::{Result, StreamVaultError};

/// Tuning for one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub transfers: u32,
    pub checksum: bool,
    pub retries: u32,
    pub chunk_size: &'static str,
}

impl TransferOptions {
    /// Attempt 1: conservative single stream with a moderate retry budget.
    pub fn careful() -> Self {
        Self {
            transfers: 1,
            checksum: true,
            retries: 3,
            chunk_size: "64M",
        }
    }

    /// Attempts 2 and 3: bigger retry budget, smaller chunks.
    pub fn persistent() -> Self {
        Self {
            transfers: 1,
            checksum: true,
            retries: 10,
            chunk_size: "32M",
        }
    }
}

/// Remote-store operations, kept behind a trait so the retry ladder can be
/// exercised without the real tool.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Idempotent folder creation; "already exists" is success.
    async fn ensure_folder(&self, remote_folder: &str) -> Result<()>;

    /// Copy a file to an exact remote destination.
    async fn copy_to(&self, local: &Path, remote_target: &str, options: &TransferOptions)
        -> Result<()>;

    /// Copy a file into a remote folder, letting the tool pick the name.
    async fn copy_into(&self, local: &Path, remote_folder: &str, options: &TransferOptions)
        -> Result<()>;
}

/// Upload `local` into `remote_folder`, escalating strategy on the transient
/// "not found" class. First clean exit wins; otherwise the last failure is
/// returned.
pub async fn upload(
    transport: &dyn RemoteTransport,
    local: &Path,
    remote_folder: &str,
) -> Result<()> {
    let file_name = local
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| StreamVaultError::Validation(format!("not a file: {}", local.display())))?;
    let target = format!("{}/{}", remote_folder.trim_end_matches('/'), file_name);

    transport
        .ensure_folder(remote_folder)
        .await
        .context("could not create the remote folder")?;

    let first_error = match transport.copy_to(local, &target, &TransferOptions::careful()).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    let direct_error = if is_transient_race(&first_error) {
        tracing::warn!(
            "Remote race on {}, re-asserting folder and retrying with smaller chunks",
            target
        );
        if let Err(err) = transport.ensure_folder(remote_folder).await {
            tracing::warn!("Folder re-assert failed: {:#}", err);
        }
        match transport
            .copy_to(local, &target, &TransferOptions::persistent())
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => err,
        }
    } else {
        first_error
    };

    tracing::warn!(
        "Direct copy failed ({:#}), falling back to directory-target copy",
        direct_error
    );
    match transport
        .copy_into(local, remote_folder, &TransferOptions::persistent())
        .await
    {
        Ok(()) => Ok(()),
        Err(err) => Err(err.context(format!("upload of {} failed", local.display()))),
    }
}

/// The retryable metadata-propagation class: the destination tool cannot see
/// an item that was just created.
fn is_transient_race(err: &anyhow::Error) -> bool {
    if let Some(StreamVaultError::RemoteRace(_)) = err.downcast_ref::<StreamVaultError>() {
        return true;
    }
    format!("{:#}", err).to_lowercase().contains("not found")
}

/// One entry of the tool's JSON listing.
#[derive(Debug, Deserialize)]
struct ListedEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "IsDir")]
    is_dir: bool,
}

/// Directory and file names under a remote path.
#[derive(Debug, Default)]
pub struct RemoteListing {
    pub folders: Vec<String>,
    pub files: Vec<String>,
}

/// rclone-backed transport.
pub struct RcloneTransport {
    binary: String,
}

impl RcloneTransport {
    pub fn new() -> Self {
        Self {
            binary: "rclone".to_string(),
        }
    }

    /// List one level of a remote path, split into folders and files.
    pub async fn list(&self, remote_path: &str) -> Result<RemoteListing> {
        let output = self.run(&["lsjson".to_string(), remote_path.to_string()]).await?;

        let entries: Vec<ListedEntry> =
            serde_json::from_slice(&output).context("could not parse the remote listing")?;

        let mut listing = RemoteListing::default();
        for entry in entries {
            if entry.is_dir {
                listing.folders.push(entry.name);
            } else {
                listing.files.push(entry.name);
            }
        }
        listing.folders.sort();
        listing.files.sort();

        Ok(listing)
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|_| StreamVaultError::ToolUnavailable("rclone".to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.to_lowercase().contains("not found") {
                return Err(StreamVaultError::RemoteRace(stderr).into());
            }
            return Err(StreamVaultError::ToolFailed {
                tool: "rclone".to_string(),
                detail: stderr,
            }
            .into());
        }

        Ok(output.stdout)
    }

    fn transfer_args(options: &TransferOptions) -> Vec<String> {
        let mut args = vec![
            "--transfers".to_string(),
            options.transfers.to_string(),
            "--retries".to_string(),
            options.retries.to_string(),
            "--drive-chunk-size".to_string(),
            options.chunk_size.to_string(),
        ];
        if options.checksum {
            args.push("--checksum".to_string());
        }
        args
    }
}

impl Default for RcloneTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTransport for RcloneTransport {
    async fn ensure_folder(&self, remote_folder: &str) -> Result<()> {
        self.run(&["mkdir".to_string(), remote_folder.to_string()])
            .await
            .map(|_| ())
    }

    async fn copy_to(
        &self,
        local: &Path,
        remote_target: &str,
        options: &TransferOptions,
    ) -> Result<()> {
        let mut args = vec![
            "copyto".to_string(),
            local.to_string_lossy().to_string(),
            remote_target.to_string(),
        ];
        args.extend(Self::transfer_args(options));
        self.run(&args).await.map(|_| ())
    }

    async fn copy_into(
        &self,
        local: &Path,
        remote_folder: &str,
        options: &TransferOptions,
    ) -> Result<()> {
        let mut args = vec![
            "copy".to_string(),
            local.to_string_lossy().to_string(),
            remote_folder.to_string(),
        ];
        args.extend(Self::transfer_args(options));
        self.run(&args).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        copy_to_errors: Mutex<Vec<Option<String>>>,
        copy_into_error: Mutex<Option<String>>,
        ensure_calls: Mutex<usize>,
        copy_to_calls: Mutex<Vec<TransferOptions>>,
        copy_into_calls: Mutex<usize>,
    }

    #[async_trait]
    impl RemoteTransport for ScriptedTransport {
        async fn ensure_folder(&self, _remote_folder: &str) -> Result<()> {
            *self.ensure_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn copy_to(
            &self,
            _local: &Path,
            _remote_target: &str,
            options: &TransferOptions,
        ) -> Result<()> {
            self.copy_to_calls.lock().unwrap().push(options.clone());
            let mut errors = self.copy_to_errors.lock().unwrap();
            if errors.is_empty() {
                return Ok(());
            }
            match errors.remove(0) {
                Some(text) => Err(anyhow::anyhow!(text)),
                None => Ok(()),
            }
        }

        async fn copy_into(
            &self,
            _local: &Path,
            _remote_folder: &str,
            _options: &TransferOptions,
        ) -> Result<()> {
            *self.copy_into_calls.lock().unwrap() += 1;
            match self.copy_into_error.lock().unwrap().clone() {
                Some(text) => Err(anyhow::anyhow!(text)),
                None => Ok(()),
            }
        }
    }

    fn local() -> PathBuf {
        PathBuf::from("/tmp/capture.mp4")
    }

    #[tokio::test]
    async fn test_race_escalates_to_smaller_chunks_then_succeeds() {
        let transport = ScriptedTransport::default();
        transport
            .copy_to_errors
            .lock()
            .unwrap()
            .extend([Some("remote item not found".to_string()), None]);

        upload(&transport, &local(), "archive/recordings").await.unwrap();

        let calls = transport.copy_to_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], TransferOptions::careful());
        assert_eq!(calls[1], TransferOptions::persistent());
        assert!(calls[1].retries > calls[0].retries);
        assert_eq!(calls[0].chunk_size, "64M");
        assert_eq!(calls[1].chunk_size, "32M");
        // folder asserted once up front and once after the race
        assert_eq!(*transport.ensure_calls.lock().unwrap(), 2);
        assert_eq!(*transport.copy_into_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_race_failure_falls_back_to_directory_copy() {
        let transport = ScriptedTransport::default();
        transport
            .copy_to_errors
            .lock()
            .unwrap()
            .push(Some("permission denied".to_string()));

        upload(&transport, &local(), "archive").await.unwrap();

        assert_eq!(transport.copy_to_calls.lock().unwrap().len(), 1);
        assert_eq!(*transport.ensure_calls.lock().unwrap(), 1);
        assert_eq!(*transport.copy_into_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_attempts_failing_reports_last_error() {
        let transport = ScriptedTransport::default();
        transport
            .copy_to_errors
            .lock()
            .unwrap()
            .extend([Some("object not found".to_string()), Some("object not found".to_string())]);
        *transport.copy_into_error.lock().unwrap() = Some("quota exceeded".to_string());

        let err = upload(&transport, &local(), "archive").await.unwrap_err();
        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert_eq!(*transport.copy_into_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clean_first_attempt_short_circuits() {
        let transport = ScriptedTransport::default();

        upload(&transport, &local(), "archive").await.unwrap();

        assert_eq!(transport.copy_to_calls.lock().unwrap().len(), 1);
        assert_eq!(*transport.copy_into_calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_race_classification() {
        assert!(is_transient_race(&anyhow::anyhow!("remote item NOT FOUND")));
        assert!(is_transient_race(
            &StreamVaultError::RemoteRace("listing lag".to_string()).into()
        ));
        assert!(!is_transient_race(&anyhow::anyhow!("permission denied")));
    }

    #[test]
    fn test_listing_parses_dirs_and_files() {
        let raw = r#"[
            {"Path":"b.mp4","Name":"b.mp4","IsDir":false},
            {"Path":"live","Name":"live","IsDir":true},
            {"Path":"a.mp4","Name":"a.mp4","IsDir":false}
        ]"#;
        let entries: Vec<ListedEntry> = serde_json::from_str(raw).unwrap();

        let mut listing = RemoteListing::default();
        for entry in entries {
            if entry.is_dir {
                listing.folders.push(entry.name);
            } else {
                listing.files.push(entry.name);
            }
        }
        listing.files.sort();

        assert_eq!(listing.folders, vec!["live"]);
        assert_eq!(listing.files, vec!["a.mp4", "b.mp4"]);
    }
}
