//! Free-space gate consulted before destructive work.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

/// Reports the space available to the filesystem holding a path.
pub trait FreeSpaceProbe: Send + Sync {
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// Probe backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSpaceProbe;

impl FreeSpaceProbe for FsSpaceProbe {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs4::available_space(path)
    }
}

/// A probe plus the minimum number of free bytes required.
#[derive(Clone)]
pub struct SpaceGate {
    probe: Arc<dyn FreeSpaceProbe>,
    min_free_bytes: u64,
}

impl SpaceGate {
    pub fn new(probe: Arc<dyn FreeSpaceProbe>, min_free_bytes: u64) -> Self {
        Self {
            probe,
            min_free_bytes,
        }
    }

    /// Whether `path` has at least the configured free space.
    ///
    /// Fails open: a probe error is logged and treated as enough space.
    pub fn has_free_space(&self, path: &Path) -> bool {
        match self.probe.available_bytes(path) {
            Ok(available) => available >= self.min_free_bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "free space probe failed, assuming space is available");
                true
            }
        }
    }
}

impl std::fmt::Debug for SpaceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpaceGate")
            .field("min_free_bytes", &self.min_free_bytes)
            .finish()
    }
}
