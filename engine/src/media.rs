use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{error, info};

// --- Media helpers ----------------------------------------------------------

/// Reduces an uploaded filename to something safe to join onto the video dir.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; whitespace becomes `_`;
/// anything else (path separators included) is dropped. Leading dots and
/// underscores are stripped so the result can't be hidden or `..`.
/// Returns `None` if nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    // Browsers on some platforms send the full client path.
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Makes sure the fallback clip exists, generating a one second 320x240 black
/// H.264 clip with ffmpeg when it doesn't. Failure is logged; the engine runs
/// without a fallback in that case.
pub async fn ensure_fallback_video(path: &Path, ffmpeg: &str) -> bool {
    if path.is_file() {
        return true;
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!("cannot create directory for fallback video {}: {e}", path.display());
            return false;
        }
    }

    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner")
        .arg("-loglevel").arg("error")
        .arg("-y")
        .arg("-f").arg("lavfi")
        .arg("-i").arg("color=c=black:s=320x240:d=1")
        .arg("-vcodec").arg("libx264")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null());

    match cmd.status().await {
        Ok(status) if status.success() && path.is_file() => {
            info!("created fallback video at {}", path.display());
            true
        }
        Ok(status) => {
            error!("ffmpeg could not create fallback video {} ({status}); please create it manually", path.display());
            false
        }
        Err(e) => {
            error!("failed to run {ffmpeg} to create fallback video: {e}; please create it manually");
            false
        }
    }
}
