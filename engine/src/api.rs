use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::media::sanitize_filename;
use crate::playlist::{PlaylistEntry, PlaylistStore};
use crate::supervisor::{StatusSnapshot, Supervisor};

// HTTP surface.
//
// Playlist endpoints go to the store and then tell the supervisor what
// changed; playback endpoints go straight to the supervisor and answer with
// its status snapshot. Everything that isn't an API route is served from the
// static UI directory.

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub playlist: PlaylistStore,
    pub video_dir: PathBuf,
}

pub fn build_router(state: AppState, static_dir: PathBuf, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/videos", get(api_list_videos))
        .route(
            "/api/videos/upload",
            post(api_upload_video).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/videos/:filename", delete(api_delete_video))
        .route("/api/playlist/reorder", post(api_reorder_playlist))
        .route("/api/playback/play", post(api_play))
        .route("/api/playback/pause", post(api_pause))
        .route("/api/playback/stop", post(api_stop))
        .route("/api/playback/next", post(api_next))
        .route("/api/playback/previous", post(api_previous))
        .route("/api/playback/status", get(api_status))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<T, ApiError>;

// --- Playlist ---------------------------------------------------------------

async fn api_list_videos(State(state): State<AppState>) -> ApiResult<Json<Vec<PlaylistEntry>>> {
    // Files deleted behind our back drop out of the playlist here.
    let removed = state.playlist.retain_existing(&state.video_dir).await?;
    for filename in &removed {
        state.supervisor.on_entry_removed(filename).await?;
    }
    Ok(Json(state.playlist.all().await?))
}

async fn api_upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some("video") {
            continue;
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        if raw_name.is_empty() {
            return Err(ApiError::bad_request("No selected file"));
        }
        let filename = sanitize_filename(&raw_name)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid filename {raw_name:?}")))?;
        let path = state.video_dir.join(&filename);

        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("error creating {}: {e}", path.display());
            ApiError::internal(format!("Error saving file: {e}"))
        })?;
        let written: Result<(), String> = async {
            while let Some(chunk) = field.chunk().await.map_err(|e| e.to_string())? {
                file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            }
            file.flush().await.map_err(|e| e.to_string())
        }
        .await;
        if let Err(e) = written {
            error!("error saving uploaded file {filename}: {e}");
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(ApiError::internal(format!("Error saving file: {e}")));
        }

        if state.playlist.append(PlaylistEntry::from_filename(&filename)).await? {
            info!("uploaded {filename} and appended it to the playlist");
        } else {
            info!("uploaded {filename} (already in playlist, file replaced)");
        }
        return Ok((
            StatusCode::CREATED,
            Json(json!({"message": "Video uploaded successfully", "filename": filename})),
        ));
    }
    Err(ApiError::bad_request("No video file part"))
}

async fn api_delete_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    // The path segment is used as a file name under video_dir, never a path.
    if sanitize_filename(&filename).as_deref() != Some(filename.as_str()) {
        return Err(ApiError::bad_request(format!("Invalid filename {filename:?}")));
    }

    let path = state.video_dir.join(&filename);
    let in_playlist = state.playlist.remove(&filename).await?;
    let on_disk = path.is_file();
    if !in_playlist && !on_disk {
        return Err(ApiError::not_found("Video not found"));
    }

    info!("video {filename} is being deleted");
    state.supervisor.on_entry_removed(&filename).await?;

    if on_disk {
        tokio::fs::remove_file(&path).await.map_err(|e| {
            error!("error deleting video file {filename}: {e}");
            ApiError::internal(format!("Error deleting file: {e}"))
        })?;
    }
    Ok(Json(json!({"message": "Video deleted successfully"})))
}

#[derive(Deserialize)]
struct ReorderReq {
    playlist: Option<Vec<String>>,
}

async fn api_reorder_playlist(
    State(state): State<AppState>,
    Json(req): Json<ReorderReq>,
) -> ApiResult<Json<serde_json::Value>> {
    let order = req.playlist.ok_or_else(|| ApiError::bad_request("Playlist data missing"))?;
    state.playlist.reorder(order).await.map_err(|e| {
        warn!("rejected reorder: {e}");
        ApiError::from(e)
    })?;
    state.supervisor.on_playlist_changed().await?;
    Ok(Json(json!({"message": "Playlist reordered successfully"})))
}

// --- Playback ---------------------------------------------------------------

#[derive(Deserialize, Default)]
struct PlayReq {
    filename: Option<String>,
}

async fn api_play(
    State(state): State<AppState>,
    body: Option<Json<PlayReq>>,
) -> ApiResult<Json<StatusSnapshot>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let filename = req.filename.filter(|f| !f.is_empty());
    Ok(Json(state.supervisor.play(filename.as_deref()).await?))
}

async fn api_pause(State(state): State<AppState>) -> ApiResult<Json<StatusSnapshot>> {
    Ok(Json(state.supervisor.pause().await?))
}

async fn api_stop(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.supervisor.stop().await)
}

async fn api_next(State(state): State<AppState>) -> ApiResult<Json<StatusSnapshot>> {
    Ok(Json(state.supervisor.next().await?))
}

async fn api_previous(State(state): State<AppState>) -> ApiResult<Json<StatusSnapshot>> {
    Ok(Json(state.supervisor.previous().await?))
}

async fn api_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.supervisor.status().await)
}
