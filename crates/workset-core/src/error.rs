use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid repo URI: {uri}")]
    InvalidRepoUri { uri: String },
    #[error("git {op} failed for {repo}: {detail}")]
    Subprocess {
        op: String,
        repo: String,
        detail: String,
    },
    #[error("timed out waiting for directory lock on {}", path.display())]
    LockTimeout { path: PathBuf },
    #[error("no workset root found at or above {}", start.display())]
    NoWorkspaceRoot { start: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
