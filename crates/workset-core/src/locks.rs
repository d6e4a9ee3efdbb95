use crate::error::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// Process-wide table of per-directory locks. Entries are created lazily and
/// live as long as the registry; two operations on different directories
/// never contend, two on the same directory are totally ordered.
#[derive(Default)]
pub struct LockRegistry {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the lock guarding `dir`. The registry mutex is released as
    /// soon as the entry exists, so it never serializes unrelated
    /// directories.
    pub fn handle_for(&self, dir: &Path) -> DirLock {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = table.entry(dir.to_path_buf()).or_default().clone();
        DirLock {
            path: dir.to_path_buf(),
            slot,
        }
    }
}

/// Lock handle scoped to one working directory.
pub struct DirLock {
    path: PathBuf,
    slot: Arc<Mutex<()>>,
}

impl DirLock {
    /// Block until the directory is free. A stuck holder blocks forever;
    /// callers that need a bound use [`DirLock::lock_timeout`].
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bounded wait for the directory lock.
    pub fn lock_timeout(&self, wait: Duration) -> Result<MutexGuard<'_, ()>, Error> {
        let deadline = Instant::now() + wait;
        loop {
            match self.slot.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {}
            }
            if Instant::now() >= deadline {
                return Err(Error::LockTimeout {
                    path: self.path.clone(),
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
