use std::sync::Arc;

use tracing::{error, info, warn};

use playdeck_engine::api::{build_router, AppState};
use playdeck_engine::config::Config;
use playdeck_engine::media::ensure_fallback_video;
use playdeck_engine::{PlaylistStore, ProcessHandle, Supervisor};

// playdeck engine
//
// Drives one video player on the attached screen:
//   - Keep an ordered playlist of uploaded videos (SQLite)
//   - Start/stop the external player for transport requests
//   - Show a black fallback clip whenever nothing else should be on screen
//   - Serve the browser UI and a small JSON API

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let version = env!("CARGO_PKG_VERSION");
    let cfg = Config::from_env()?;

    tokio::fs::create_dir_all(&cfg.video_dir).await?;

    if !ensure_fallback_video(&cfg.fallback_video, &cfg.ffmpeg).await {
        error!(
            "CRITICAL: fallback video {} does not exist. Stopping playback will not show a black screen.",
            cfg.fallback_video.display()
        );
    }

    let playlist = PlaylistStore::open(&cfg.db_path).await?;
    info!("playlist database at {}", playlist.path().display());

    if cfg.orphan_name.is_none() {
        warn!("orphaned player sweep disabled");
    }
    let handle = ProcessHandle::new(&cfg.player, cfg.stop_grace).with_orphan_sweep(cfg.orphan_name.clone());
    let supervisor = Arc::new(Supervisor::new(
        handle,
        playlist.clone(),
        &cfg.video_dir,
        &cfg.fallback_video,
    ));

    let state = AppState {
        supervisor: supervisor.clone(),
        playlist,
        video_dir: cfg.video_dir.clone(),
    };
    let app = build_router(state, cfg.static_dir.clone(), cfg.max_upload_bytes);

    info!("playdeck engine v{version} starting on http://{}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Don't leave a player running on the screen after we're gone.
    supervisor.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.ok(); };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
