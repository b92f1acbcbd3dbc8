//! Persistent status surface for a running timer
//!
//! While the timer process runs it keeps one user-visible status entry
//! showing the latest elapsed time. The entry exists from start to stop.

use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where the running timer shows its latest time
pub trait StatusSurface: Send + Sync {
    /// Create or replace the entry with the given `HH:MM:SS`
    fn show(&self, formatted: &str);
    /// Remove the entry
    fn clear(&self);
}

/// Status entry kept as a small text file.
///
/// `show`/`clear` only publish the desired content; a writer task owns the
/// file and applies the latest value, so the tick loop never does file IO.
/// Updates that arrive faster than the disk are coalesced.
pub struct FileStatusSurface {
    path: PathBuf,
    desired: watch::Sender<Option<String>>,
    writer: JoinHandle<()>,
}

impl FileStatusSurface {
    /// Must be called inside a tokio runtime
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let (desired, rx) = watch::channel(None);
        let writer = tokio::spawn(write_loop(path.clone(), rx));
        Self { path, desired, writer }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileStatusSurface {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

impl StatusSurface for FileStatusSurface {
    fn show(&self, formatted: &str) {
        self.desired.send_replace(Some(format!("Session running - {}\n", formatted)));
    }

    fn clear(&self) {
        self.desired.send_replace(None);
    }
}

async fn write_loop(path: PathBuf, mut rx: watch::Receiver<Option<String>>) {
    while rx.changed().await.is_ok() {
        let next = rx.borrow_and_update().clone();
        match next {
            Some(line) => {
                if let Err(e) = tokio::fs::write(&path, line).await {
                    warn!(path = %path.display(), error = %e, "status_surface_write_failed");
                }
            }
            None => match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "status_surface_cleared"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "status_surface_clear_failed")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::{sleep, timeout, Duration};

    async fn wait_until<F: Fn(&Path) -> bool>(path: &Path, f: F) {
        timeout(Duration::from_secs(5), async {
            while !f(path) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status file settled");
    }

    fn content(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    #[tokio::test]
    async fn test_show_then_clear() {
        let dir = tempdir().unwrap();
        let surface = FileStatusSurface::new(dir.path().join("status.txt"));

        surface.show("00:00:01");
        surface.show("00:00:02");
        wait_until(surface.path(), |p| {
            content(p).as_deref() == Some("Session running - 00:00:02\n")
        })
        .await;

        surface.clear();
        wait_until(surface.path(), |p| !p.exists()).await;

        // Clearing twice is fine
        surface.clear();
        surface.show("00:00:00");
        wait_until(surface.path(), |p| {
            content(p).as_deref() == Some("Session running - 00:00:00\n")
        })
        .await;
    }

    #[tokio::test]
    async fn test_show_does_not_touch_the_file_inline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("status.txt");
        let surface = FileStatusSurface::new(&path);

        // Unwritable target: the call returns immediately, the writer logs
        surface.show("00:00:01");
        surface.clear();
        sleep(Duration::from_millis(20)).await;
        assert!(!path.exists());
    }
}
