use crate::error::Error;
use crate::paths;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One manifest entry: a repository URI and the ref it must be checked out
/// to. Immutable per synchronization run.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepoSpec {
    pub repo: String,
    #[serde(rename = "ref")]
    pub target_ref: String,
}

/// Ordered list of repositories the workspace tracks, stored as a JSON
/// array of `{"repo": …, "ref": …}` records.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    pub repos: Vec<RepoSpec>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("read manifest {}", path.display()))?;
        let manifest = serde_json::from_str(&data).context("parse manifest")?;
        Ok(manifest)
    }

    /// Write via a temp file and rename so a crash never leaves a torn
    /// manifest behind.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create manifest directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize manifest")?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).with_context(|| format!("write manifest {}", tmp.display()))?;
        fs::rename(&tmp, path).context("replace manifest")?;
        Ok(())
    }

    /// Insert `spec`, replacing any entry that resolves to the same
    /// canonical path.
    pub fn add(&mut self, spec: RepoSpec) -> Result<(), Error> {
        let key = paths::canonical_path(&spec.repo)?;
        for existing in &mut self.repos {
            if paths::canonical_path(&existing.repo).is_ok_and(|k| k == key) {
                *existing = spec;
                return Ok(());
            }
        }
        self.repos.push(spec);
        Ok(())
    }
}
