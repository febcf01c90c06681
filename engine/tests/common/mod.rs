#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use playdeck_engine::api::{build_router, AppState};
use playdeck_engine::{PlaylistEntry, PlaylistStore, ProcessHandle, Supervisor};
use tempfile::TempDir;

pub const GRACE: Duration = Duration::from_millis(500);

// Stand-in for the real player. It records itself in the markers directory
// (file named after its pid, holding the media path) and removes the marker
// when it quits on 'q', on stdin EOF, or on SIGTERM. Any other byte, such as
// 'p', is ignored.
const FAKE_PLAYER: &str = r#"#!/bin/sh
marker="@MARKERS@/$$"
printf '%s\n' "$3" > "$marker"
trap 'rm -f "$marker"; exit 0' TERM
while :; do
    c=$(dd bs=1 count=1 2>/dev/null)
    if [ -z "$c" ] || [ "$c" = q ]; then
        rm -f "$marker"
        exit 0
    fi
done
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

pub struct Fixture {
    pub dir: TempDir,
    pub video_dir: PathBuf,
    pub fallback: PathBuf,
    pub markers: PathBuf,
    pub store: PlaylistStore,
    pub supervisor: Arc<Supervisor>,
}

impl Fixture {
    /// Playlist of `files` (each created empty in the video dir), with or
    /// without a fallback clip on disk.
    pub async fn new(files: &[&str], with_fallback: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let video_dir = dir.path().join("videos");
        let markers = dir.path().join("markers");
        std::fs::create_dir(&video_dir).unwrap();
        std::fs::create_dir(&markers).unwrap();

        let fallback = dir.path().join("black.mp4");
        if with_fallback {
            std::fs::write(&fallback, b"").unwrap();
        }

        let store = PlaylistStore::open(dir.path().join("playlist.db")).await.unwrap();
        for f in files {
            std::fs::write(video_dir.join(f), b"").unwrap();
            store.append(PlaylistEntry::from_filename(f)).await.unwrap();
        }

        let script = FAKE_PLAYER.replace("@MARKERS@", &markers.display().to_string());
        let player = write_script(dir.path(), "fake-player", &script);
        let handle = ProcessHandle::new(player, GRACE);
        let supervisor = Arc::new(Supervisor::new(handle, store.clone(), &video_dir, &fallback));

        Fixture { dir, video_dir, fallback, markers, store, supervisor }
    }

    pub fn router(&self) -> axum::Router {
        let state = AppState {
            supervisor: self.supervisor.clone(),
            playlist: self.store.clone(),
            video_dir: self.video_dir.clone(),
        };
        build_router(state, self.dir.path().join("static"), 1024 * 1024)
    }

    /// (pid, media path) of every fake player currently running.
    pub fn live_players(&self) -> Vec<(u32, String)> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.markers).unwrap() {
            let entry = entry.unwrap();
            let pid = entry.file_name().to_string_lossy().parse().unwrap();
            let media = std::fs::read_to_string(entry.path()).unwrap_or_default();
            out.push((pid, media.trim().to_string()));
        }
        out
    }

    /// Waits until exactly one player is running and has recorded its media
    /// path, and returns that path. Fails if two players are ever seen.
    pub async fn single_player(&self) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let live = self.live_players();
            assert!(live.len() <= 1, "more than one player alive: {live:?}");
            if let [(_, media)] = live.as_slice() {
                if !media.is_empty() {
                    return media.clone();
                }
            }
            assert!(Instant::now() < deadline, "no player started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Asserts that no player is running right now.
    pub fn assert_no_player(&self) {
        let live = self.live_players();
        assert!(live.is_empty(), "unexpected players: {live:?}");
    }

    pub fn video(&self, name: &str) -> String {
        self.video_dir.join(name).display().to_string()
    }

    pub fn fallback_path(&self) -> String {
        self.fallback.display().to_string()
    }
}
