use crate::workspace;
use anyhow::Context;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive file lock keeping two sync runs from interleaving on one
/// workspace root. The holder's PID is written into the file for
/// diagnostics.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    file: File,
}

impl SyncLock {
    /// `Ok(None)` when another process already holds the lock for `root`.
    pub fn try_acquire(root: &Path) -> anyhow::Result<Option<Self>> {
        let path = root.join(workspace::MARKER_DIR).join("sync.lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create lock directory")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lock file {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Some(Self { path, file }))
            }
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err).context("lock sync lock file"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    matches!(err.raw_os_error(), Some(33))
}
