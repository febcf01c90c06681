use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

// Runtime configuration.
//
// Everything is read from PLAYDECK_* environment variables once at startup.
// Unset variables take the defaults below; numeric values that fail to parse
// are logged and replaced by their default rather than aborting startup.

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_DB_PATH: &str = "playlist.db";
pub const DEFAULT_VIDEO_DIR: &str = "videos";
pub const DEFAULT_FALLBACK_VIDEO: &str = "black.mp4";
pub const DEFAULT_PLAYER: &str = "omxplayer";
pub const DEFAULT_ORPHAN_NAME: &str = "omxplayer.bin";
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub video_dir: PathBuf,
    pub fallback_video: PathBuf,
    pub player: PathBuf,
    /// Process name targeted by the orphan sweep; `None` disables it.
    pub orphan_name: Option<String>,
    pub stop_grace: Duration,
    pub ffmpeg: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. `from_env` is the only
    /// production caller; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind: SocketAddr = lookup("PLAYDECK_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()?;

        let fallback_video = absolute(
            lookup("PLAYDECK_FALLBACK_VIDEO")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_VIDEO)),
        );

        // An explicitly empty name switches the sweep off.
        let orphan_name = match lookup("PLAYDECK_ORPHAN_NAME") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_ORPHAN_NAME.to_string()),
        };

        let stop_grace_ms = parse_or_default(&lookup, "PLAYDECK_STOP_GRACE_MS", DEFAULT_STOP_GRACE_MS);
        let max_upload_bytes = parse_or_default(&lookup, "PLAYDECK_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Config {
            bind,
            db_path: lookup("PLAYDECK_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            video_dir: lookup("PLAYDECK_VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEO_DIR)),
            fallback_video,
            player: lookup("PLAYDECK_PLAYER")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLAYER)),
            orphan_name,
            stop_grace: Duration::from_millis(stop_grace_ms),
            ffmpeg: lookup("PLAYDECK_FFMPEG").unwrap_or_else(|| "ffmpeg".to_string()),
            static_dir: lookup("PLAYDECK_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            max_upload_bytes,
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("ignoring invalid {key}={raw:?}, using default {default}");
                default
            }
        },
    }
}

// The player is started from whatever directory the engine runs in, so the
// fallback path is pinned down once here.
fn absolute(p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(p),
        Err(_) => p,
    }
}
