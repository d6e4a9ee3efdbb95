use crate::error::Error;
use crate::manifest::Manifest;
use anyhow::Context;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker directory identifying a managed workspace root.
pub const MARKER_DIR: &str = ".workset";
pub const MANIFEST_FILE: &str = "manifest.json";
/// Environment override consulted before walking ancestors.
pub const ROOT_ENV: &str = "WORKSET_ROOT";

pub fn is_root(path: &Path) -> bool {
    path.join(MARKER_DIR).is_dir()
}

/// Closest managed root at or above `start`.
pub fn find_root(start: &Path) -> Result<PathBuf, Error> {
    if let Ok(root) = env::var(ROOT_ENV) {
        let root = PathBuf::from(root);
        if is_root(&root) {
            return Ok(root);
        }
    }
    let mut dir = start.canonicalize().map_err(|_| Error::NoWorkspaceRoot {
        start: start.to_path_buf(),
    })?;
    loop {
        if is_root(&dir) {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(Error::NoWorkspaceRoot {
                start: start.to_path_buf(),
            });
        }
    }
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MARKER_DIR).join(MANIFEST_FILE)
}

/// Create the marker directory and an empty manifest unless one exists.
pub fn init_root(path: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(path.join(MARKER_DIR))
        .with_context(|| format!("create {} in {}", MARKER_DIR, path.display()))?;
    let manifest = manifest_path(path);
    if !manifest.exists() {
        Manifest::default().save(&manifest)?;
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_marker_and_empty_manifest() {
        let tmp = TempDir::new().unwrap();
        init_root(tmp.path()).unwrap();
        assert!(is_root(tmp.path()));
        let manifest = Manifest::load(&manifest_path(tmp.path())).unwrap();
        assert!(manifest.repos.is_empty());
    }

    #[test]
    fn find_root_walks_ancestors() {
        let tmp = TempDir::new().unwrap();
        init_root(tmp.path()).unwrap();
        let nested = tmp.path().join("github.com/a/b/src");
        fs::create_dir_all(&nested).unwrap();
        let found = find_root(&nested).unwrap();
        assert_eq!(found, tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn find_root_fails_outside_a_workspace() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            find_root(tmp.path()),
            Err(Error::NoWorkspaceRoot { .. })
        ));
    }

    #[test]
    fn init_is_idempotent_and_preserves_manifest() {
        let tmp = TempDir::new().unwrap();
        init_root(tmp.path()).unwrap();
        let mut manifest = Manifest::load(&manifest_path(tmp.path())).unwrap();
        manifest
            .add(crate::manifest::RepoSpec {
                repo: "a/b".to_string(),
                target_ref: "main".to_string(),
            })
            .unwrap();
        manifest.save(&manifest_path(tmp.path())).unwrap();

        init_root(tmp.path()).unwrap();
        let reloaded = Manifest::load(&manifest_path(tmp.path())).unwrap();
        assert_eq!(reloaded.repos.len(), 1);
    }
}
