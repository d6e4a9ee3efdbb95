use crate::error::Error;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DEFAULT_HOST: &str = "github.com";

/// URI forms accepted for manifest entries, tried in order; the bare
/// `[host/]owner/name` form must stay last because it matches almost
/// anything.
fn scheme_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^[^@/]+@(?P<host>[^:/]+):(?P<owner>[^/]+)/(?P<name>[^/]+)$")
                .expect("ssh pattern compiles"),
            Regex::new(r"^https://(?P<host>[^/]+)/(?P<owner>[^/]+)/(?P<name>[^/]+)$")
                .expect("https pattern compiles"),
            Regex::new(r"^git://(?P<host>[^/]+)/(?P<owner>[^/]+)/(?P<name>[^/]+)$")
                .expect("git pattern compiles"),
            Regex::new(r"^(?:(?P<host>[^/]+)/)?(?P<owner>[^/]+)/(?P<name>[^/]+)$")
                .expect("bare pattern compiles"),
        ]
    })
}

/// Canonical `host/owner/name` for a repository URI. Deterministic and
/// idempotent; doubles as the synchronization key and the on-disk
/// subdirectory below the workspace root.
pub fn canonical_path(uri: &str) -> Result<String, Error> {
    for pattern in scheme_patterns() {
        let Some(caps) = pattern.captures(uri) else {
            continue;
        };
        let host = caps
            .name("host")
            .map(|m| m.as_str())
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST);
        let owner = &caps["owner"];
        let raw_name = caps.name("name").map(|m| m.as_str()).unwrap_or("");
        let name = raw_name.strip_suffix(".git").unwrap_or(raw_name);
        if name.is_empty() {
            break;
        }
        return Ok(format!("{host}/{owner}/{name}"));
    }
    Err(Error::InvalidRepoUri {
        uri: uri.to_string(),
    })
}

/// Working directory for a repository under the workspace root.
pub fn repo_dir(root: &Path, uri: &str) -> Result<PathBuf, Error> {
    let canonical = canonical_path(uri)?;
    let mut dir = root.to_path_buf();
    for segment in canonical.split('/') {
        dir.push(segment);
    }
    Ok(dir)
}
