// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Asset downloading.
//!
//! Model weights and the label font are fetched from Ultralytics GitHub
//! releases on first use when they are not present locally.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{AnnotateError, Result};

/// Default YOLO detection model name.
pub const DEFAULT_MODEL: &str = "yolo11n.onnx";

/// URL for downloading the default YOLO model.
const DEFAULT_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n.onnx";

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Read timeout in seconds.
const READ_TIMEOUT: u64 = 300;

/// Progress bar width in characters.
const BAR_WIDTH: usize = 12;

/// Minimum seconds between progress redraws.
const MIN_UPDATE_INTERVAL: f64 = 0.1;

/// Format bytes as human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Format a duration in seconds.
fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let mins = (seconds / 60.0) as u32;
        let secs = seconds % 60.0;
        format!("{mins}:{secs:04.1}")
    }
}

/// Generate progress bar string.
fn generate_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64) as usize;
    let partial = progress.mul_add(width as f64, -(filled as f64));

    let mut bar = "━".repeat(filled);
    if filled < width {
        if partial > 0.5 {
            bar.push('╸');
            bar.push_str(&"─".repeat(width - filled - 1));
        } else {
            bar.push_str(&"─".repeat(width - filled));
        }
    }
    bar
}

fn download_error(msg: String) -> AnnotateError {
    AnnotateError::Io(io::Error::other(msg))
}

/// Redraw the progress line on stderr.
fn draw_progress(desc: &str, downloaded: u64, total: u64, elapsed: f64, done: bool) {
    let rate = if elapsed > 0.0 {
        downloaded as f64 / elapsed
    } else {
        0.0
    };
    let line = if total > 0 {
        let progress = (downloaded as f64 / total as f64).min(1.0);
        format!(
            "{desc}: {}% {} {}/{} {}/s {}",
            (progress * 100.0) as u8,
            generate_bar(progress, BAR_WIDTH),
            format_bytes(downloaded as f64),
            format_bytes(total as f64),
            format_bytes(rate),
            format_time(elapsed)
        )
    } else {
        format!(
            "{desc}: {} {}/s {}",
            format_bytes(downloaded as f64),
            format_bytes(rate),
            format_time(elapsed)
        )
    };

    if done {
        eprintln!("\r\x1b[K{line}");
    } else {
        eprint!("\r\x1b[K{line}");
        io::stderr().flush().ok();
    }
}

/// Download a file from `url` to `dest` with a progress bar.
///
/// The body is streamed into `<dest>.part` and renamed into place once
/// complete, so an interrupted download never leaves a truncated `dest`.
///
/// # Errors
///
/// Returns [`AnnotateError::Io`] on network or filesystem failures.
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_recv_body(Some(Duration::from_secs(READ_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        download_error(match &e {
            ureq::Error::Timeout(_) => format!("Connection timed out while downloading {url}"),
            ureq::Error::Io(io_err) => format!("Network error downloading {url}: {io_err}"),
            _ => format!("Failed to download {url}: {e}"),
        })
    })?;

    let total_size: u64 = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp_path = dest.with_extension("part");
    let _ = fs::remove_file(&temp_path);

    let mut writer = BufWriter::new(File::create(&temp_path)?);
    let mut reader = response.into_body().into_reader();
    let desc = format!("Downloading {url} to '{}'", dest.display());

    let start_time = Instant::now();
    let mut last_update = Instant::now();
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 65536];

    let streamed: Result<()> = (|| {
        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .map_err(|e| download_error(format!("Failed to read from network: {e}")))?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;

            if last_update.elapsed().as_secs_f64() >= MIN_UPDATE_INTERVAL {
                last_update = Instant::now();
                draw_progress(&desc, downloaded, total_size, start_time.elapsed().as_secs_f64(), false);
            }
        }
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    draw_progress(&desc, downloaded, total_size, start_time.elapsed().as_secs_f64(), true);

    fs::rename(&temp_path, dest).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        download_error(format!("Failed to move downloaded file to {}: {e}", dest.display()))
    })
}

/// Download a model if its file name is a known release asset.
///
/// Only [`DEFAULT_MODEL`] is downloadable. The file is written to `model_path`.
///
/// # Errors
///
/// Returns [`AnnotateError::DetectorUnavailable`] if the name is not a known
/// model or the download fails.
pub fn try_download_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if filename != DEFAULT_MODEL {
        return Err(AnnotateError::DetectorUnavailable(format!(
            "Model file not found: {}. Auto-download is only supported for {DEFAULT_MODEL}",
            path.display(),
        )));
    }

    tracing::info!(model = %path.display(), "model not found locally, downloading");
    download_file(DEFAULT_MODEL_URL, path)
        .map_err(|e| AnnotateError::DetectorUnavailable(e.to_string()))?;

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_returns_error() {
        let result = try_download_model("unknown_model.onnx");
        let err = result.unwrap_err();
        assert!(matches!(err, AnnotateError::DetectorUnavailable(_)));
        assert!(err.to_string().contains("Auto-download is only supported"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500.0), "500B");
        assert_eq!(format_bytes(1024.0), "1.0KB");
        assert_eq!(format_bytes(1_048_576.0), "1.0MB");
        assert_eq!(format_bytes(1_073_741_824.0), "1.0GB");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(5.5), "5.5s");
        assert_eq!(format_time(65.0), "1:05.0");
    }

    #[test]
    fn test_generate_bar() {
        assert_eq!(generate_bar(0.0, 10), "──────────");
        assert_eq!(generate_bar(1.0, 10), "━━━━━━━━━━");
        assert_eq!(generate_bar(0.5, 10), "━━━━━─────");
    }
}
