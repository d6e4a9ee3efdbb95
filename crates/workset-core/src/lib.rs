//! Core engine for workset: keeps a manifest's repositories cloned, pulled
//! and checked out to their pinned refs, running one git subprocess per
//! repository in parallel and folding every repository's textual progress
//! into a single aggregate event stream.

pub mod combine;
pub mod error;
pub mod git_sync;
pub mod lockfile;
pub mod locks;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod repo_status;
pub mod runner;
pub mod sync_engine;
pub mod workspace;

pub use error::Error;
pub use git_sync::{DetachedPull, GitVcs, Vcs};
pub use manifest::{Manifest, RepoSpec};
pub use progress::ProgressEvent;
pub use repo_status::RepoStatus;
pub use runner::CancelToken;
pub use sync_engine::{SyncEngine, SyncOptions};
