//! Playback supervisor.
//!
//! Owns the single [`ProcessHandle`], the playlist cursor and the logical
//! player state, all behind one async mutex. Every transport operation is
//! stop-then-maybe-start under that lock, so two requests can never leave two
//! players fighting over the display.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{Result, SupervisorError};
use crate::player::{ProcessHandle, CONTROL_PAUSE};
use crate::playlist::{PlaylistEntry, PlaylistStore};

pub const FALLBACK_DISPLAY_NAME: &str = "Black Screen";

/// What the supervisor last asked the player to show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    PlayingContent { index: usize, entry: PlaylistEntry },
    PlayingFallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CurrentVideo {
    Entry(PlaylistEntry),
    /// Serialized like an entry: `{"filename": "black.mp4", "name": "Black Screen"}`.
    Fallback(PlaylistEntry),
}

impl CurrentVideo {
    pub fn is_fallback(&self) -> bool {
        matches!(self, CurrentVideo::Fallback(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_playing: bool,
    pub current_video: Option<CurrentVideo>,
    /// Cursor position, `-1` when unset.
    pub current_index: i64,
}

// The cursor remembers which entry it points at, not just where. Indices go
// stale when the store changes underneath us; the filename does not.
#[derive(Clone, Debug)]
struct Cursor {
    index: usize,
    filename: String,
}

struct Inner {
    handle: ProcessHandle,
    cursor: Option<Cursor>,
    state: PlayerState,
}

pub struct Supervisor {
    inner: Mutex<Inner>,
    playlist: PlaylistStore,
    video_dir: PathBuf,
    fallback_video: PathBuf,
}

impl Supervisor {
    pub fn new(
        handle: ProcessHandle,
        playlist: PlaylistStore,
        video_dir: impl Into<PathBuf>,
        fallback_video: impl Into<PathBuf>,
    ) -> Self {
        Supervisor {
            inner: Mutex::new(Inner { handle, cursor: None, state: PlayerState::Idle }),
            playlist,
            video_dir: video_dir.into(),
            fallback_video: fallback_video.into(),
        }
    }

    /// Plays `filename`, or resumes from the cursor when none is given.
    ///
    /// Without a filename the cursor is kept unless it is unset or on the last
    /// entry, in which case playback restarts from the top.
    pub async fn play(&self, filename: Option<&str>) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        let playlist = self.playlist.all().await?;
        if playlist.is_empty() {
            return Err(SupervisorError::EmptyPlaylist);
        }

        let index = match filename {
            Some(name) => position_of(&playlist, name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?,
            None => resume_index(locate(inner.cursor.as_ref(), &playlist), playlist.len()),
        };
        self.start_content(&mut inner, &playlist, index).await
    }

    /// Toggles pause on the running player.
    pub async fn pause(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        if !reconcile(&mut inner) {
            return Err(SupervisorError::NotRunning);
        }
        inner.handle.send_control(CONTROL_PAUSE).await?;
        info!("playback pause/resume toggled");
        Ok(self.snapshot(&mut inner))
    }

    /// Stops playback and shows the fallback video, or goes idle if the
    /// fallback file is missing. Never fails.
    pub async fn stop(&self) -> StatusSnapshot {
        let mut inner = self.inner.lock().await;
        info!("stop requested; stopping player and displaying fallback");
        self.switch_to_fallback(&mut inner).await;
        self.snapshot(&mut inner)
    }

    pub async fn next(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        let playlist = self.playlist.all().await?;
        if playlist.is_empty() {
            return Err(SupervisorError::EmptyPlaylist);
        }
        let index = next_index(locate(inner.cursor.as_ref(), &playlist), playlist.len());
        self.start_content(&mut inner, &playlist, index).await
    }

    pub async fn previous(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        let playlist = self.playlist.all().await?;
        if playlist.is_empty() {
            return Err(SupervisorError::EmptyPlaylist);
        }
        let index = previous_index(locate(inner.cursor.as_ref(), &playlist), playlist.len());
        self.start_content(&mut inner, &playlist, index).await
    }

    /// Call after `filename` has been removed from the store. If it is what is
    /// on screen, playback falls back and the cursor is cleared; otherwise the
    /// cursor is re-pointed at the entry that keeps playing.
    pub async fn on_entry_removed(&self, filename: &str) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        reconcile(&mut inner);

        let removed_is_playing = matches!(
            &inner.state,
            PlayerState::PlayingContent { entry, .. } if entry.filename == filename
        );
        if removed_is_playing {
            info!("video {filename} removed while playing; switching to fallback");
            self.switch_to_fallback(&mut inner).await;
        } else {
            self.reindex(&mut inner).await?;
        }
        Ok(self.snapshot(&mut inner))
    }

    /// Call after a reorder (or any mutation that may shift indices).
    pub async fn on_playlist_changed(&self) -> Result<StatusSnapshot> {
        let mut inner = self.inner.lock().await;
        reconcile(&mut inner);
        self.reindex(&mut inner).await?;
        Ok(self.snapshot(&mut inner))
    }

    /// Current status. Liveness of the process wins over the recorded state.
    pub async fn status(&self) -> StatusSnapshot {
        let mut inner = self.inner.lock().await;
        self.snapshot(&mut inner)
    }

    pub async fn state(&self) -> PlayerState {
        let mut inner = self.inner.lock().await;
        reconcile(&mut inner);
        inner.state.clone()
    }

    pub async fn cursor(&self) -> Option<usize> {
        self.inner.lock().await.cursor.as_ref().map(|c| c.index)
    }

    /// Stops the player for good; used on engine exit.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.handle.stop().await;
        inner.state = PlayerState::Idle;
        info!("player shut down");
    }

    pub fn fallback_marker(&self) -> PlaylistEntry {
        let filename = self
            .fallback_video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        PlaylistEntry::new(filename, FALLBACK_DISPLAY_NAME)
    }

    async fn start_content(
        &self,
        inner: &mut Inner,
        playlist: &[PlaylistEntry],
        index: usize,
    ) -> Result<StatusSnapshot> {
        let entry = playlist[index].clone();
        inner.cursor = Some(Cursor { index, filename: entry.filename.clone() });
        inner.handle.stop().await;
        inner.state = PlayerState::Idle;

        let path = self.video_dir.join(&entry.filename);
        match inner.handle.start(&path).await {
            Ok(()) => {
                info!("playing video {} at index {index}", path.display());
                inner.state = PlayerState::PlayingContent { index, entry };
                Ok(self.snapshot(inner))
            }
            Err(e) => {
                error!("could not play {}: {e}", entry.filename);
                self.show_fallback(inner).await;
                Err(e.into())
            }
        }
    }

    async fn switch_to_fallback(&self, inner: &mut Inner) {
        inner.handle.stop().await;
        inner.state = PlayerState::Idle;
        inner.cursor = None;
        self.show_fallback(inner).await;
    }

    // Expects the handle to be stopped already.
    async fn show_fallback(&self, inner: &mut Inner) {
        if !self.fallback_video.is_file() {
            warn!(
                "fallback video not found at {}; player stopped, but screen might not be black",
                self.fallback_video.display()
            );
            return;
        }
        match inner.handle.start(&self.fallback_video).await {
            Ok(()) => {
                info!("playing fallback video {}", self.fallback_video.display());
                inner.state = PlayerState::PlayingFallback;
            }
            Err(e) => warn!("could not start fallback video: {e}"),
        }
    }

    // Re-points the cursor (and the playing state's index) at wherever its
    // entry now sits. Content whose entry is gone is replaced by the fallback.
    async fn reindex(&self, inner: &mut Inner) -> Result<()> {
        let Some(cursor) = inner.cursor.clone() else {
            return Ok(());
        };
        let playing = matches!(
            &inner.state,
            PlayerState::PlayingContent { entry, .. } if entry.filename == cursor.filename
        );

        let playlist = self.playlist.all().await?;
        match position_of(&playlist, &cursor.filename) {
            Some(i) if i == cursor.index => {}
            Some(i) => {
                info!("video {} moved from index {} to {i}", cursor.filename, cursor.index);
                if let PlayerState::PlayingContent { index, .. } = &mut inner.state {
                    *index = i;
                }
                inner.cursor = Some(Cursor { index: i, ..cursor });
            }
            None if playing => {
                warn!(
                    "playing video {} is no longer in the playlist; switching to fallback",
                    cursor.filename
                );
                self.switch_to_fallback(inner).await;
            }
            // Clamped when next dereferenced.
            None => {}
        }
        Ok(())
    }

    fn snapshot(&self, inner: &mut Inner) -> StatusSnapshot {
        let alive = reconcile(inner);
        let current_video = match &inner.state {
            _ if !alive => None,
            PlayerState::PlayingContent { entry, .. } => Some(CurrentVideo::Entry(entry.clone())),
            PlayerState::PlayingFallback => Some(CurrentVideo::Fallback(self.fallback_marker())),
            PlayerState::Idle => None,
        };
        StatusSnapshot {
            is_playing: current_video.is_some(),
            current_video,
            current_index: inner.cursor.as_ref().map(|c| c.index as i64).unwrap_or(-1),
        }
    }
}

// The process may have exited on its own (end of file, crash). Liveness is
// authoritative: a dead process means the recorded state is reset to Idle.
// The cursor is left alone so next/previous continue from where it was.
fn reconcile(inner: &mut Inner) -> bool {
    let alive = inner.handle.is_alive();
    if !alive && inner.state != PlayerState::Idle {
        info!("player no longer running; state {:?} reset to idle", inner.state);
        inner.state = PlayerState::Idle;
    }
    alive
}

fn position_of(playlist: &[PlaylistEntry], filename: &str) -> Option<usize> {
    playlist.iter().position(|e| e.filename == filename)
}

// Where the cursor's entry sits in a fresh snapshot. The stored index is only
// used when the entry itself has been removed.
fn locate(cursor: Option<&Cursor>, playlist: &[PlaylistEntry]) -> Option<usize> {
    cursor.map(|c| position_of(playlist, &c.filename).unwrap_or(c.index))
}

// Cursor arithmetic. All of these take a non-zero playlist length and clamp a
// stale cursor (the playlist may have shrunk since it was set).

fn clamp(cursor: Option<usize>, len: usize) -> Option<usize> {
    cursor.map(|c| c.min(len - 1))
}

fn resume_index(cursor: Option<usize>, len: usize) -> usize {
    match cursor {
        Some(c) if c + 1 < len => c,
        _ => 0,
    }
}

fn next_index(cursor: Option<usize>, len: usize) -> usize {
    match clamp(cursor, len) {
        Some(c) => (c + 1) % len,
        None => 0,
    }
}

fn previous_index(cursor: Option<usize>, len: usize) -> usize {
    match clamp(cursor, len) {
        Some(c) => (c + len - 1) % len,
        None => len - 1,
    }
}
