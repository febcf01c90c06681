//! playdeck engine: single-screen video playlist controller.
//!
//! A [`supervisor::Supervisor`] drives one external player process at a time
//! and keeps a black fallback clip on screen whenever nothing else should be.
//! The playlist is persisted in SQLite and everything is exposed over a small
//! JSON HTTP API.

pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod player;
pub mod playlist;
pub mod supervisor;

pub use error::{ApiError, PlayerError, StoreError, SupervisorError};
pub use player::ProcessHandle;
pub use playlist::{PlaylistEntry, PlaylistStore};
pub use supervisor::{CurrentVideo, PlayerState, StatusSnapshot, Supervisor};
