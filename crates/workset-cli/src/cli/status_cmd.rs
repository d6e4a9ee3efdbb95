use super::args::StatusArgs;
use super::{current_root, load_manifest};
use workset_core::{RepoStatus, SyncEngine, SyncOptions};

/// Print a status table ordered the way you want to read it: repositories
/// that are both off-ref and dirty first, then dirty, then off-ref; clean
/// repositories only with `--all`.
pub(super) fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let root = current_root()?;
    let manifest = load_manifest(&root)?;
    let engine = SyncEngine::new(&root, SyncOptions::default());
    let mut statuses = engine.status(&manifest);
    statuses.sort_by(|a, b| a.repo.cmp(&b.repo));

    let mut both = Vec::new();
    let mut changed = Vec::new();
    let mut branched = Vec::new();
    let mut clean = Vec::new();
    for status in statuses {
        match (status.is_dirty(), status.is_branched()) {
            (true, true) => both.push(status),
            (true, false) => changed.push(status),
            (false, true) => branched.push(status),
            (false, false) => clean.push(status),
        }
    }

    println!(
        "{:<44} {:<28} {:^6} {:^8} {:^9}",
        "Repo", "Ref (Orig)", "Staged", "Unstaged", "Untracked"
    );
    for status in both.iter().chain(&changed).chain(&branched) {
        print_row(status);
    }
    if args.all {
        for status in &clean {
            print_row(status);
        }
    }
    Ok(())
}

fn print_row(status: &RepoStatus) {
    println!(
        "{:<44} {:<28} {:^6} {:^8} {:^9}",
        status.repo,
        ref_cell(status),
        mark(status.staged),
        mark(status.unstaged),
        mark(status.untracked)
    );
}

fn ref_cell(status: &RepoStatus) -> String {
    if status.is_branched() {
        format!("{} ({})", status.branch, status.orig_ref)
    } else {
        status.branch.clone()
    }
}

fn mark(flag: bool) -> &'static str {
    if flag { "*" } else { "" }
}
