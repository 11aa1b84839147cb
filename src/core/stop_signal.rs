//! Cooperative cancellation. A run polls [`StopSignal::consume`] at its checkpoints;
//! the control plane (or a test) calls [`StopSignal::request`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub trait StopSignal: Send + Sync {
    fn is_requested(&self) -> bool;

    /// Returns `true` and clears the signal if it was set.
    fn consume(&self) -> bool;

    fn request(&self);

    /// Drop any leftover signal without honoring it.
    fn clear(&self) {
        let _ = self.consume();
    }
}

/// Marker file; existence is the signal, content is ignored.
#[derive(Debug, Clone)]
pub struct FileStopSignal {
    path: PathBuf,
}

impl FileStopSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StopSignal for FileStopSignal {
    fn is_requested(&self) -> bool {
        self.path.exists()
    }

    fn consume(&self) -> bool {
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                // Still counts as honored; a stale file is cleared at next run start.
                warn!("stop signal: failed to remove {}: {}", self.path.display(), e);
                true
            }
        }
    }

    fn request(&self) {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        if let Err(e) = std::fs::write(&self.path, b"STOP") {
            warn!("stop signal: failed to create {}: {}", self.path.display(), e);
        }
    }
}

/// In-process token with the same checkpoint contract as [`FileStopSignal`].
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StopSignal for StopToken {
    fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn consume(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
