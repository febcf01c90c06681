//! Error types for the engine.
//!
//! Library code returns these `thiserror` enums; the HTTP layer turns them
//! into status codes through [`ApiError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures of a single player invocation.
#[derive(Error, Debug)]
pub enum PlayerError {
    /// The executable could not be spawned or the media path is unusable.
    #[error("failed to launch player: {0}")]
    Launch(String),

    /// No live process, or its stdin pipe is closed.
    #[error("player control channel unavailable: {0}")]
    Channel(String),
}

/// Playlist persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("playlist database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("playlist task failed: {0}")]
    Task(String),

    /// A reorder request that is not a permutation of the current playlist.
    #[error("invalid playlist order: {0}")]
    InvalidOrder(String),
}

/// Everything a Supervisor operation can report back to its caller.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Playlist is empty")]
    EmptyPlaylist,

    #[error("Video {0} not in playlist")]
    NotFound(String),

    #[error("Player not running or already stopped")]
    NotRunning,

    #[error(transparent)]
    Launch(PlayerError),

    #[error(transparent)]
    Channel(PlayerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PlayerError> for SupervisorError {
    fn from(e: PlayerError) -> Self {
        match e {
            PlayerError::Launch(_) => SupervisorError::Launch(e),
            PlayerError::Channel(_) => SupervisorError::Channel(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// JSON error response: `{"error": "..."}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<SupervisorError> for ApiError {
    fn from(e: SupervisorError) -> Self {
        let status = match &e {
            SupervisorError::EmptyPlaylist | SupervisorError::NotRunning => StatusCode::BAD_REQUEST,
            SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
            SupervisorError::Store(StoreError::InvalidOrder(_)) => StatusCode::BAD_REQUEST,
            SupervisorError::Launch(_) | SupervisorError::Channel(_) | SupervisorError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        SupervisorError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
