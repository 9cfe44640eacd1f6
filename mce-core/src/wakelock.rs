//! Suspend blocking
//!
//! Every pending fpd call and every armed timer in the fingerprint module
//! holds a [`WakelockGuard`]. The underlying kernel wakelock is taken when
//! the first guard is created and released when the last one is dropped.

use parking_lot::Mutex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::constants::paths;

/// Something that can actually block system suspend
#[cfg_attr(test, mockall::automock)]
pub trait WakelockBackend: Send + Sync {
    fn lock(&self, name: &str);
    fn unlock(&self, name: &str);
}

/// Backend writing to /sys/power/wake_lock and /sys/power/wake_unlock
pub struct SysfsWakelock {
    lock_path: PathBuf,
    unlock_path: PathBuf,
}

impl SysfsWakelock {
    pub fn new() -> Self {
        Self {
            lock_path: PathBuf::from(paths::WAKE_LOCK),
            unlock_path: PathBuf::from(paths::WAKE_UNLOCK),
        }
    }

    /// Whether the kernel exposes the wakelock interface at all
    pub fn is_supported() -> bool {
        Path::new(paths::WAKE_LOCK).exists()
    }

    fn write(path: &Path, name: &str) {
        let result = OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|mut f| f.write_all(name.as_bytes()));
        if let Err(e) = result {
            warn!("{}: write {}: {}", path.display(), name, e);
        }
    }
}

impl Default for SysfsWakelock {
    fn default() -> Self {
        Self::new()
    }
}

impl WakelockBackend for SysfsWakelock {
    fn lock(&self, name: &str) {
        Self::write(&self.lock_path, name);
    }

    fn unlock(&self, name: &str) {
        Self::write(&self.unlock_path, name);
    }
}

/// Backend for systems without wakelock support
struct NullWakelock;

impl WakelockBackend for NullWakelock {
    fn lock(&self, _name: &str) {}
    fn unlock(&self, _name: &str) {}
}

struct WakelockInner {
    name: String,
    count: Mutex<usize>,
    backend: Box<dyn WakelockBackend>,
}

/// Reference counted named wakelock
#[derive(Clone)]
pub struct Wakelock {
    inner: Arc<WakelockInner>,
}

impl Wakelock {
    pub fn new(name: impl Into<String>, backend: Box<dyn WakelockBackend>) -> Self {
        Self {
            inner: Arc::new(WakelockInner {
                name: name.into(),
                count: Mutex::new(0),
                backend,
            }),
        }
    }

    /// Wakelock that only counts references
    pub fn disabled(name: impl Into<String>) -> Self {
        Self::new(name, Box::new(NullWakelock))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of live guards
    pub fn count(&self) -> usize {
        *self.inner.count.lock()
    }

    pub fn acquire(&self) -> WakelockGuard {
        let mut count = self.inner.count.lock();
        *count += 1;
        if *count == 1 {
            trace!("wakelock {} locked", self.inner.name);
            self.inner.backend.lock(&self.inner.name);
        }
        WakelockGuard { lock: self.clone() }
    }

    fn release(&self) {
        let mut count = self.inner.count.lock();
        match *count {
            0 => warn!("wakelock {}: unbalanced release", self.inner.name),
            1 => {
                *count = 0;
                trace!("wakelock {} unlocked", self.inner.name);
                self.inner.backend.unlock(&self.inner.name);
            }
            _ => *count -= 1,
        }
    }
}

impl fmt::Debug for Wakelock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wakelock")
            .field("name", &self.inner.name)
            .field("count", &self.count())
            .finish()
    }
}

/// Holds the wakelock until dropped
pub struct WakelockGuard {
    lock: Wakelock,
}

impl fmt::Debug for WakelockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WakelockGuard({})", self.lock.name())
    }
}

impl Drop for WakelockGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}
