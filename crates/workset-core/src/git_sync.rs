use crate::error::Error;
use crate::manifest::RepoSpec;
use crate::progress::ProgressEvent;
use crate::repo_status::{RepoStatus, classify_records};
use crate::runner::CommandRunner;
use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tracing::{info, warn};

/// What `rev-parse --abbrev-ref HEAD` prints for a detached working tree.
const DETACHED_PLACEHOLDER: &str = "HEAD";

/// Long-lived branches given tracking setup after a clone; absent upstream
/// branches are expected and the calls are intentionally non-fatal.
const TRACKING_BRANCHES: [&str; 2] = ["main", "master"];

/// What Pull does when the working tree is detached: there is no upstream
/// branch to merge, but fetching anyway keeps remote refs fresh for a later
/// checkout.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DetachedPull {
    #[default]
    Skip,
    FetchOnly,
}

/// Version-control capability consumed by the sync engine. Injectable so
/// the orchestrator can run against a double.
pub trait Vcs: Send + Sync {
    fn clone_repo(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent>;
    fn pull(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent>;
    fn checkout(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent>;
    fn status(&self, spec: &RepoSpec, dir: &Path) -> Result<RepoStatus, Error>;
}

/// Git driver over the [`CommandRunner`].
#[derive(Clone)]
pub struct GitVcs {
    runner: CommandRunner,
    detached_pull: DetachedPull,
}

impl GitVcs {
    pub fn new(runner: CommandRunner, detached_pull: DetachedPull) -> Self {
        Self {
            runner,
            detached_pull,
        }
    }

    /// Current checkout of `dir` as `(name, is_branch)`. Detached trees
    /// resolve to an exact tag when one applies, else an abbreviated commit
    /// hash.
    pub fn current_ref(&self, repo: &str, dir: &Path) -> Result<(String, bool), Error> {
        let name = self
            .runner
            .run_capture(repo, dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if name != DETACHED_PLACEHOLDER {
            return Ok((name, true));
        }
        if let Ok(tag) = self
            .runner
            .run_capture(repo, dir, &["describe", "--tags", "--exact-match"])
        {
            return Ok((tag, false));
        }
        let commit = self
            .runner
            .run_capture(repo, dir, &["rev-parse", "--short", "HEAD"])?;
        Ok((commit, false))
    }
}

impl Vcs for GitVcs {
    /// Clone into an absent directory, then fetch all remotes; tracking
    /// setup for the conventional long-lived branches is fire-and-forget
    /// and contributes no progress events.
    fn clone_repo(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        let runner = self.runner.clone();
        let spec = spec.clone();
        let dir = dir.to_path_buf();
        thread::spawn(move || {
            if let Some(parent) = dir.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!(
                        repo = %spec.repo,
                        path = %parent.display(),
                        error = %err,
                        "cannot create parent directories for clone"
                    );
                    return;
                }
            }
            let target = dir.to_string_lossy().into_owned();
            // the clone targets a directory that does not exist yet, so it
            // runs without a directory lock
            forward(
                runner.run(
                    &spec.repo,
                    None,
                    &["clone", "--progress", spec.repo.as_str(), target.as_str()],
                ),
                &tx,
            );
            forward(
                runner.run(&spec.repo, Some(&dir), &["fetch", "--all", "--progress"]),
                &tx,
            );
            for branch in TRACKING_BRANCHES {
                let upstream = format!("origin/{branch}");
                let _ = runner.run_capture(
                    &spec.repo,
                    &dir,
                    &["branch", "--track", branch, upstream.as_str()],
                );
            }
        });
        rx
    }

    /// Fetch all remotes, then merge the upstream of the current branch.
    /// A detached working tree has no upstream; see [`DetachedPull`].
    fn pull(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        let vcs = self.clone();
        let spec = spec.clone();
        let dir = dir.to_path_buf();
        thread::spawn(move || {
            let (name, is_branch) = match vcs.current_ref(&spec.repo, &dir) {
                Ok(current) => current,
                Err(err) => {
                    warn!(repo = %spec.repo, error = %err, "cannot determine current ref; skipping pull");
                    return;
                }
            };
            if !is_branch {
                info!(repo = %spec.repo, at = %name, "detached checkout; nothing to pull");
                if vcs.detached_pull == DetachedPull::FetchOnly {
                    forward(
                        vcs.runner.run(&spec.repo, Some(&dir), &["fetch", "--all", "--progress"]),
                        &tx,
                    );
                }
                return;
            }
            forward(
                vcs.runner.run(&spec.repo, Some(&dir), &["fetch", "--all", "--progress"]),
                &tx,
            );
            forward(
                vcs.runner.run(&spec.repo, Some(&dir), &["pull", "--progress"]),
                &tx,
            );
        });
        rx
    }

    /// No-op when the working tree already sits on the requested ref;
    /// otherwise run the checkout and log any failure without aborting the
    /// caller's pipeline.
    fn checkout(&self, spec: &RepoSpec, dir: &Path) -> Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel();
        let vcs = self.clone();
        let spec = spec.clone();
        let dir = dir.to_path_buf();
        thread::spawn(move || {
            let (name, _) = match vcs.current_ref(&spec.repo, &dir) {
                Ok(current) => current,
                Err(err) => {
                    warn!(repo = %spec.repo, error = %err, "cannot determine current ref; skipping checkout");
                    return;
                }
            };
            if name == spec.target_ref {
                return;
            }
            info!(repo = %spec.repo, from = %name, to = %spec.target_ref, "checking out");
            forward(
                vcs.runner.run(
                    &spec.repo,
                    Some(&dir),
                    &["checkout", "--progress", spec.target_ref.as_str()],
                ),
                &tx,
            );
        });
        rx
    }

    fn status(&self, spec: &RepoSpec, dir: &Path) -> Result<RepoStatus, Error> {
        let (branch, _) = self.current_ref(&spec.repo, dir)?;
        let raw = self.runner.run_capture(&spec.repo, dir, &["status", "-z"])?;
        Ok(classify_records(&spec.repo, &spec.target_ref, &branch, &raw))
    }
}

fn forward(events: Receiver<ProgressEvent>, tx: &Sender<ProgressEvent>) {
    for event in events {
        // a vanished consumer must not stop the drain; the subprocess still
        // has to run to completion and release its directory lock
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::LockRegistry;
    use crate::runner::CancelToken;
    use std::process::Command;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "tester")
            .env("GIT_AUTHOR_EMAIL", "tester@example.com")
            .env("GIT_COMMITTER_NAME", "tester")
            .env("GIT_COMMITTER_EMAIL", "tester@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        std::fs::write(dir.join("a.txt"), "a").unwrap();
        git(dir, &["add", "a.txt"]);
        git(dir, &["commit", "-q", "-m", "first"]);
    }

    fn test_vcs() -> GitVcs {
        let runner = CommandRunner::new(
            "git",
            Arc::new(LockRegistry::new()),
            CancelToken::new(),
            None,
        );
        GitVcs::new(runner, DetachedPull::Skip)
    }

    fn spec(target_ref: &str) -> RepoSpec {
        RepoSpec {
            repo: "github.com/a/b".to_string(),
            target_ref: target_ref.to_string(),
        }
    }

    #[test]
    fn current_ref_reports_branch() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let vcs = test_vcs();
        let (name, is_branch) = vcs.current_ref("a/b", tmp.path()).unwrap();
        assert_eq!(name, "main");
        assert!(is_branch);
    }

    #[test]
    fn current_ref_resolves_exact_tag_when_detached() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        git(tmp.path(), &["tag", "v1.0"]);
        git(tmp.path(), &["checkout", "-q", "--detach", "v1.0"]);
        let vcs = test_vcs();
        let (name, is_branch) = vcs.current_ref("a/b", tmp.path()).unwrap();
        assert_eq!(name, "v1.0");
        assert!(!is_branch);
    }

    #[test]
    fn checkout_is_a_no_op_on_matching_ref() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let vcs = test_vcs();
        let events: Vec<ProgressEvent> =
            vcs.checkout(&spec("main"), tmp.path()).iter().collect();
        assert!(events.is_empty());
        let (name, _) = vcs.current_ref("a/b", tmp.path()).unwrap();
        assert_eq!(name, "main");
    }

    #[test]
    fn checkout_switches_to_requested_ref() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        git(tmp.path(), &["branch", "feature"]);
        let vcs = test_vcs();
        let _ = vcs.checkout(&spec("feature"), tmp.path()).iter().count();
        let (name, is_branch) = vcs.current_ref("a/b", tmp.path()).unwrap();
        assert_eq!(name, "feature");
        assert!(is_branch);
    }

    #[test]
    fn pull_is_a_no_op_when_detached() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        git(tmp.path(), &["checkout", "-q", "--detach", "HEAD"]);
        let vcs = test_vcs();
        let events: Vec<ProgressEvent> = vcs.pull(&spec("main"), tmp.path()).iter().collect();
        assert!(events.is_empty());
    }

    #[test]
    fn clone_creates_working_tree() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        init_repo(&source);
        let vcs = test_vcs();
        let spec = RepoSpec {
            repo: source.to_string_lossy().into_owned(),
            target_ref: "main".to_string(),
        };
        let dest = tmp.path().join("mirror").join("b");
        let _ = vcs.clone_repo(&spec, &dest).iter().count();
        assert!(dest.join(".git").exists());
        let (name, is_branch) = vcs.current_ref("a/b", &dest).unwrap();
        assert_eq!(name, "main");
        assert!(is_branch);
    }

    #[test]
    fn status_reflects_working_tree_state() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        std::fs::write(tmp.path().join("new.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "changed").unwrap();
        let vcs = test_vcs();
        let status = vcs.status(&spec("main"), tmp.path()).unwrap();
        assert_eq!(status.branch, "main");
        assert!(status.untracked);
        assert!(status.unstaged);
        assert!(!status.staged);
        assert!(!status.is_branched());
    }
}
