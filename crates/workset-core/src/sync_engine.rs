use crate::combine::combine;
use crate::error::Error;
use crate::git_sync::{DetachedPull, GitVcs, Vcs};
use crate::locks::LockRegistry;
use crate::manifest::{Manifest, RepoSpec};
use crate::paths;
use crate::progress::ProgressEvent;
use crate::repo_status::RepoStatus;
use crate::runner::{CancelToken, CommandRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct SyncOptions {
    pub detached_pull: DetachedPull,
    /// Bounded wait for a repository directory lock; `None` waits
    /// indefinitely.
    pub lock_timeout: Option<Duration>,
}

/// Drives one pipeline per manifest entry: Clone or Pull depending on
/// whether the working directory exists, then Checkout once the sync stream
/// has fully drained. Pipelines are independent; one repository's failure
/// never touches another's.
pub struct SyncEngine {
    root: PathBuf,
    vcs: Arc<dyn Vcs>,
    cancel: CancelToken,
}

impl SyncEngine {
    pub fn new(root: &Path, options: SyncOptions) -> Self {
        let cancel = CancelToken::new();
        let locks = Arc::new(LockRegistry::new());
        let runner = CommandRunner::new("git", locks, cancel.clone(), options.lock_timeout);
        Self {
            root: root.to_path_buf(),
            vcs: Arc::new(GitVcs::new(runner, options.detached_pull)),
            cancel,
        }
    }

    /// Engine over a substitute driver.
    pub fn with_vcs(root: &Path, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            root: root.to_path_buf(),
            vcs,
            cancel: CancelToken::new(),
        }
    }

    /// Token that aborts in-flight subprocesses and stops new launches.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start every pipeline and return the combined aggregate progress
    /// stream. Entries with an unresolvable URI are logged and skipped.
    pub fn sync(&self, manifest: &Manifest) -> Receiver<ProgressEvent> {
        let mut streams = Vec::with_capacity(manifest.repos.len());
        for spec in &manifest.repos {
            match self.spawn_pipeline(spec) {
                Ok(stream) => streams.push(stream),
                Err(err) => {
                    warn!(repo = %spec.repo, error = %err, "skipping manifest entry");
                }
            }
        }
        combine(streams)
    }

    fn spawn_pipeline(&self, spec: &RepoSpec) -> Result<Receiver<ProgressEvent>, Error> {
        let dir = paths::repo_dir(&self.root, &spec.repo)?;
        let (tx, rx) = mpsc::channel();
        let vcs = Arc::clone(&self.vcs);
        let spec = spec.clone();
        thread::spawn(move || {
            let sync_stream = if dir.exists() {
                info!(repo = %spec.repo, "pulling");
                vcs.pull(&spec, &dir)
            } else {
                info!(repo = %spec.repo, path = %dir.display(), "cloning");
                vcs.clone_repo(&spec, &dir)
            };
            for event in sync_stream {
                let _ = tx.send(event);
            }
            // the sync stream has closed, so its subprocess has exited;
            // checkout progress never interleaves with pull progress
            for event in vcs.checkout(&spec, &dir) {
                let _ = tx.send(event);
            }
        });
        Ok(rx)
    }

    /// Point-in-time status of every manifest repository present on disk,
    /// queried in parallel; completion order.
    pub fn status(&self, manifest: &Manifest) -> Vec<RepoStatus> {
        let (tx, rx) = mpsc::channel();
        for spec in &manifest.repos {
            let dir = match paths::repo_dir(&self.root, &spec.repo) {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(repo = %spec.repo, error = %err, "skipping manifest entry");
                    continue;
                }
            };
            if !dir.exists() {
                continue;
            }
            let tx = tx.clone();
            let vcs = Arc::clone(&self.vcs);
            let spec = spec.clone();
            thread::spawn(move || match vcs.status(&spec, &dir) {
                Ok(status) => {
                    let _ = tx.send(status);
                }
                Err(err) => {
                    warn!(repo = %spec.repo, error = %err, "cannot get status");
                }
            });
        }
        drop(tx);
        rx.into_iter().collect()
    }
}
