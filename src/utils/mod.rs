use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Most recently modified regular file in `dir` with at least `min_bytes`.
///
/// Missing or unreadable directories yield `None` rather than an error so
/// callers can scan a list of historical candidate paths.
pub fn newest_file_in(dir: &Path, min_bytes: u64) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in entries.flatten() {
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        if !meta.is_file() || meta.len() < min_bytes {
            continue;
        }
        let modified = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
        if best.as_ref().map_or(true, |(seen, _)| modified > *seen) {
            best = Some((modified, entry.path()));
        }
    }

    best.map(|(_, path)| path)
}

/// Resolve the ffmpeg binary, honoring the FFMPEG_PATH override.
pub fn ffmpeg_binary() -> PathBuf {
    if let Ok(override_path) = std::env::var("FFMPEG_PATH") {
        let candidate = PathBuf::from(override_path);
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("ffmpeg")
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for downloads and live capture".to_string());
    }

    if !check_command_available(&ffmpeg_binary().to_string_lossy()).await {
        missing.push("ffmpeg - required for clipping, best-quality downloads".to_string());
    }

    if !check_command_available("rclone").await {
        missing.push("rclone - required for remote archival".to_string());
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[test]
    fn test_validate_and_normalize_url() {
        assert!(validate_and_normalize_url("https://example.com").is_ok());
        assert!(validate_and_normalize_url("http://example.com").is_ok());
        assert!(validate_and_normalize_url("ftp://example.com").is_err());
        assert!(validate_and_normalize_url("not-a-url").is_err());
    }

    #[test]
    fn test_newest_file_in_respects_min_size() {
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(dir.path().join("tiny.mp4"), b"xx").unwrap();
        assert_eq!(newest_file_in(dir.path(), 1024), None);

        std::fs::write(dir.path().join("older.mp4"), vec![0u8; 2048]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.path().join("newer.mp4"), vec![0u8; 2048]).unwrap();

        let found = newest_file_in(dir.path(), 1024).unwrap();
        assert_eq!(found.file_name().unwrap(), "newer.mp4");
    }

    #[test]
    fn test_newest_file_in_missing_dir() {
        assert_eq!(newest_file_in(Path::new("/nonexistent/streamvault"), 0), None);
    }
}
