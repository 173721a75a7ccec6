use anyhow::{Context, Result};
use inotify::{Inotify, WatchMask};
use std::ffi::OsStr;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watch the config directory and send a notification whenever the config
/// file is written or replaced.
///
/// The directory is watched rather than the file so editors that save by
/// rename are picked up. Runs on its own blocking thread.
pub fn spawn(config_path: PathBuf, tx: mpsc::UnboundedSender<()>) -> Result<()> {
    let dir = config_path
        .parent()
        .map(PathBuf::from)
        .context("config path has no parent directory")?;
    let file_name = config_path
        .file_name()
        .map(OsStr::to_os_string)
        .context("config path has no file name")?;

    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut inotify = Inotify::init().context("initialising inotify")?;
    inotify
        .watches()
        .add(&dir, WatchMask::CLOSE_WRITE | WatchMask::MOVED_TO | WatchMask::CREATE)
        .with_context(|| format!("watching {}", dir.display()))?;
    info!(path = %dir.display(), "watching config directory");

    std::thread::Builder::new()
        .name("config-watch".into())
        .spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                let events = match inotify.read_events_blocking(&mut buffer) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "inotify read failed, config reload disabled");
                        return;
                    }
                };
                let touched = events.filter(|e| e.name == Some(file_name.as_os_str())).count();
                if touched > 0 {
                    debug!(touched, "config file changed");
                    if tx.send(()).is_err() {
                        return;
                    }
                }
            }
        })
        .context("spawning config watcher thread")?;

    Ok(())
}
