use serde::Serialize;

/// Point-in-time snapshot of one repository's working tree against its
/// manifest entry. Never mutated after construction.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RepoStatus {
    pub repo: String,
    pub branch: String,
    pub orig_ref: String,
    pub staged: bool,
    pub unstaged: bool,
    pub untracked: bool,
}

impl RepoStatus {
    pub fn is_dirty(&self) -> bool {
        self.staged || self.unstaged || self.untracked
    }

    /// Checked out somewhere other than the manifest's requested ref,
    /// independent of dirty state.
    pub fn is_branched(&self) -> bool {
        self.branch != self.orig_ref
    }
}

/// Classify NUL-separated `status -z` records. The first byte decides:
/// `?` is untracked, a space is unstaged-only, anything else stages the
/// record; a non-space second byte additionally marks unstaged, so one
/// record can set several flags.
pub(crate) fn classify_records(repo: &str, orig_ref: &str, branch: &str, raw: &str) -> RepoStatus {
    let mut status = RepoStatus {
        repo: repo.to_string(),
        branch: branch.to_string(),
        orig_ref: orig_ref.to_string(),
        ..RepoStatus::default()
    };
    for record in raw.split('\0') {
        if record.is_empty() {
            continue;
        }
        let mut code = record.chars();
        let first = code.next().unwrap_or(' ');
        let second = code.next().unwrap_or(' ');
        if first == '?' {
            status.untracked = true;
            continue;
        }
        if first == ' ' {
            status.unstaged = true;
            continue;
        }
        status.staged = true;
        if second != ' ' {
            status.unstaged = true;
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: &str) -> RepoStatus {
        classify_records("a/b", "main", "main", raw)
    }

    #[test]
    fn untracked_record() {
        let status = classify("?? new.txt");
        assert!(status.untracked);
        assert!(!status.unstaged);
        assert!(!status.staged);
    }

    #[test]
    fn unstaged_record() {
        let status = classify(" M changed.txt");
        assert!(status.unstaged);
        assert!(!status.staged);
        assert!(!status.untracked);
    }

    #[test]
    fn staged_record() {
        let status = classify("M  staged.txt");
        assert!(status.staged);
        assert!(!status.unstaged);
    }

    #[test]
    fn one_record_can_set_both_staged_and_unstaged() {
        let status = classify("MM partial.txt");
        assert!(status.staged);
        assert!(status.unstaged);
    }

    #[test]
    fn multiple_records_accumulate() {
        let status = classify("?? a\0 M b\0A  c\0");
        assert!(status.untracked);
        assert!(status.unstaged);
        assert!(status.staged);
    }

    #[test]
    fn empty_output_is_clean() {
        let status = classify("");
        assert!(!status.is_dirty());
    }

    #[test]
    fn branched_is_independent_of_dirt() {
        let status = classify_records("a/b", "v1.2", "main", "");
        assert!(status.is_branched());
        assert!(!status.is_dirty());
        let on_ref = classify_records("a/b", "main", "main", "?? x");
        assert!(!on_ref.is_branched());
        assert!(on_ref.is_dirty());
    }
}
