use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error, info, warn};

use crate::error::PlayerError;

// --- External player process ----------------------------------------------
//
// One ProcessHandle wraps at most one running player. The player is launched
// as `<player> --no-osd --no-keys <media>` and controlled by single bytes on
// its stdin:
//   q  quit
//   p  toggle pause

pub const CONTROL_QUIT: u8 = b'q';
pub const CONTROL_PAUSE: u8 = b'p';

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    media: PathBuf,
}

pub struct ProcessHandle {
    player: PathBuf,
    grace: Duration,
    orphan_name: Option<String>,
    running: Option<Running>,
}

impl ProcessHandle {
    /// `grace` bounds each of the first two shutdown tiers in [`stop`](Self::stop).
    pub fn new(player: impl Into<PathBuf>, grace: Duration) -> Self {
        ProcessHandle { player: player.into(), grace, orphan_name: None, running: None }
    }

    /// Enables the orphan sweep for processes with this exact name.
    pub fn with_orphan_sweep(mut self, name: Option<String>) -> Self {
        self.orphan_name = name;
        self
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.child.id())
    }

    /// Media path of the process currently held, if any.
    pub fn media(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.media.as_path())
    }

    /// Launches the player against `media`. Any process already held is
    /// stopped first. On error the handle holds nothing.
    pub async fn start(&mut self, media: &Path) -> Result<(), PlayerError> {
        if self.running.is_some() {
            self.stop().await;
        }

        if !media.is_file() {
            error!("cannot play {}: file does not exist", media.display());
            return Err(PlayerError::Launch(format!("{} does not exist", media.display())));
        }

        let mut cmd = Command::new(&self.player);
        cmd.arg("--no-osd")
            .arg("--no-keys")
            .arg(media)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true);

        info!("executing player: {} --no-osd --no-keys {}", self.player.display(), media.display());

        let mut child = cmd.spawn().map_err(|e| {
            error!("error starting player {}: {e}", self.player.display());
            PlayerError::Launch(format!("{}: {e}", self.player.display()))
        })?;
        let stdin = child.stdin.take();

        info!(pid = ?child.id(), "player started for {}", media.display());
        self.running = Some(Running { child, stdin, media: media.to_path_buf() });
        Ok(())
    }

    /// Non-blocking liveness probe. A process found to have exited is
    /// released here.
    pub fn is_alive(&mut self) -> bool {
        let Some(running) = self.running.as_mut() else {
            return false;
        };
        let alive = match running.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("player for {} exited on its own ({status})", running.media.display());
                false
            }
            Err(e) => {
                warn!("player try_wait error: {e}");
                false
            }
        };
        if !alive {
            self.running = None;
        }
        alive
    }

    pub async fn send_control(&mut self, byte: u8) -> Result<(), PlayerError> {
        if !self.is_alive() {
            return Err(PlayerError::Channel("no player process is running".into()));
        }
        let stdin = self
            .running
            .as_mut()
            .and_then(|r| r.stdin.as_mut())
            .ok_or_else(|| PlayerError::Channel("player stdin is closed".into()))?;

        let res = async {
            stdin.write_all(&[byte]).await?;
            stdin.flush().await
        }
        .await;
        res.map_err(|e| {
            warn!("error sending {:?} to player: {e}", byte as char);
            PlayerError::Channel(e.to_string())
        })
    }

    /// Shuts the player down, escalating quit → SIGTERM → SIGKILL.
    ///
    /// The first two tiers wait at most `grace` each; the kill tier waits until
    /// the OS reports the process gone. Always leaves the handle empty, then
    /// runs the orphan sweep if enabled.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            self.shutdown(running).await;
        }
        self.sweep_orphans().await;
    }

    async fn shutdown(&self, running: Running) {
        let Running { mut child, stdin, media } = running;

        if let Ok(Some(status)) = child.try_wait() {
            debug!("player for {} had already exited ({status})", media.display());
            return;
        }

        // Tier 1: ask politely. Dropping stdin at the end of this block also
        // gives the player EOF.
        if let Some(mut stdin) = stdin {
            let sent = async {
                stdin.write_all(&[CONTROL_QUIT]).await?;
                stdin.flush().await
            }
            .await;
            match sent {
                Ok(()) => match tokio::time::timeout(self.grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!("player stopped via 'q' ({status})");
                        return;
                    }
                    Ok(Err(e)) => warn!("error waiting for player after 'q': {e}. Terminating."),
                    Err(_) => warn!("player ignored 'q' for {:?}. Terminating.", self.grace),
                },
                Err(e) => warn!("failed to send 'q' to player: {e}. Terminating."),
            }
        }

        // Tier 2: SIGTERM.
        if terminate(&child) {
            match tokio::time::timeout(self.grace, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("player terminated ({status})");
                    return;
                }
                Ok(Err(e)) => error!("error waiting for player after SIGTERM: {e}. Killing."),
                Err(_) => error!("player ignored SIGTERM for {:?}. Killing.", self.grace),
            }
        }

        // Tier 3: SIGKILL, then wait for as long as it takes.
        if let Err(e) = child.start_kill() {
            error!("failed to kill player: {e}");
        }
        match child.wait().await {
            Ok(status) => info!("player killed ({status})"),
            Err(e) => error!("error reaping killed player: {e}"),
        }
    }

    // A player left over from a previous run (or a grandchild that outlived
    // its wrapper) would keep the display busy. Anything with the configured
    // name still alive at this point is not ours.
    async fn sweep_orphans(&self) {
        let Some(name) = self.orphan_name.clone() else {
            return;
        };
        let res = tokio::task::spawn_blocking(move || signal_by_name(&name)).await;
        match res {
            Ok(0) => debug!("orphan sweep found nothing"),
            Ok(n) => warn!("orphan sweep signalled {n} stray player process(es)"),
            Err(e) => warn!("orphan sweep task failed: {e}"),
        }
    }
}

fn terminate(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    let Some(process) = sys.process(pid) else {
        warn!("player pid {pid} not found for SIGTERM");
        return false;
    };
    match process.kill_with(Signal::Term) {
        Some(true) => true,
        Some(false) => {
            warn!("SIGTERM to player pid {pid} failed");
            false
        }
        None => {
            warn!("SIGTERM not supported on this platform");
            false
        }
    }
}

fn signal_by_name(name: &str) -> usize {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let own = Pid::from_u32(std::process::id());

    let mut signalled = 0;
    for process in sys.processes_by_exact_name(OsStr::new(name)) {
        if process.pid() == own {
            continue;
        }
        let ok = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
        if ok {
            signalled += 1;
        } else {
            warn!(pid = %process.pid(), "failed to signal stray {name}");
        }
    }
    signalled
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("clip.mp4");
        std::fs::write(&media, b"").unwrap();

        let mut handle = ProcessHandle::new(dir.path().join("no-such-player"), Duration::from_millis(100));
        let err = handle.start(&media).await.unwrap_err();
        assert!(matches!(err, PlayerError::Launch(_)));
        assert!(!handle.is_alive());
        assert!(handle.pid().is_none());
    }

    #[tokio::test]
    async fn missing_media_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = ProcessHandle::new("/bin/sh", Duration::from_millis(100));
        let err = handle.start(&dir.path().join("gone.mp4")).await.unwrap_err();
        assert!(matches!(err, PlayerError::Launch(_)));
        assert!(handle.media().is_none());
    }

    #[tokio::test]
    async fn control_without_process_is_a_channel_error() {
        let mut handle = ProcessHandle::new("/bin/sh", Duration::from_millis(100));
        let err = handle.send_control(CONTROL_PAUSE).await.unwrap_err();
        assert!(matches!(err, PlayerError::Channel(_)));
    }

    #[tokio::test]
    async fn stop_on_empty_handle_is_a_no_op() {
        let mut handle = ProcessHandle::new("/bin/sh", Duration::from_millis(100));
        handle.stop().await;
        handle.stop().await;
        assert!(!handle.is_alive());
    }
}
