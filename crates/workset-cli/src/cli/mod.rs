mod args;
mod render;
mod status_cmd;

use anyhow::Context;
use args::{AddArgs, Cli, Commands, InitArgs, LsArgs, SyncArgs};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use workset_core::lockfile::SyncLock;
use workset_core::{DetachedPull, Manifest, RepoSpec, SyncEngine, SyncOptions, paths, workspace};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => run_init(args),
        Commands::Add(args) => run_add(args),
        Commands::Sync(args) => run_sync(args),
        Commands::Status(args) => status_cmd::run_status(args),
        Commands::Ls(args) => run_ls(args),
        Commands::Root => run_root(),
    }
}

fn current_root() -> anyhow::Result<PathBuf> {
    let cwd = env::current_dir().context("resolve current directory")?;
    Ok(workspace::find_root(&cwd)?)
}

fn load_manifest(root: &Path) -> anyhow::Result<Manifest> {
    Manifest::load(&workspace::manifest_path(root))
        .context("no manifest; `workset add` repositories first")
}

fn run_init(args: InitArgs) -> anyhow::Result<()> {
    let target = match args.root {
        Some(root) => root,
        None => env::current_dir().context("resolve current directory")?,
    };
    let root = workspace::init_root(&target)?;
    println!("Initialized workset root at {}", root.display());
    Ok(())
}

fn run_add(args: AddArgs) -> anyhow::Result<()> {
    let root = current_root()?;
    let path = workspace::manifest_path(&root);
    let mut manifest = if path.exists() {
        Manifest::load(&path)?
    } else {
        Manifest::default()
    };
    let spec = RepoSpec {
        repo: args.repo,
        target_ref: args.target_ref,
    };
    let key = paths::canonical_path(&spec.repo)?;
    manifest.add(spec)?;
    manifest.save(&path)?;
    println!("Added {key}");
    Ok(())
}

fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let root = current_root()?;
    let Some(_lock) = SyncLock::try_acquire(&root)? else {
        anyhow::bail!("another sync is already running for {}", root.display());
    };
    let manifest = load_manifest(&root)?;
    if manifest.repos.is_empty() {
        println!("Manifest is empty; nothing to sync.");
        return Ok(());
    }
    info!(root = %root.display(), repos = manifest.repos.len(), "starting sync");

    let options = SyncOptions {
        detached_pull: if args.fetch_detached {
            DetachedPull::FetchOnly
        } else {
            DetachedPull::Skip
        },
        lock_timeout: args.lock_timeout.map(Duration::from_secs),
    };
    let engine = SyncEngine::new(&root, options);
    render::render_progress(engine.sync(&manifest));
    println!("Synced {} repositories.", manifest.repos.len());
    Ok(())
}

fn run_ls(args: LsArgs) -> anyhow::Result<()> {
    let root = current_root()?;
    let manifest = load_manifest(&root)?;
    for spec in &manifest.repos {
        let Ok(dir) = paths::repo_dir(&root, &spec.repo) else {
            continue;
        };
        if let Some(pattern) = &args.pattern {
            if !dir.to_string_lossy().contains(pattern.as_str()) {
                continue;
            }
        }
        println!("{}", dir.display());
    }
    Ok(())
}

fn run_root() -> anyhow::Result<()> {
    println!("{}", current_root()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn parses_add_with_default_ref() {
        let cli = parse(&["workset", "add", "git@github.com:a/b"]);
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.repo, "git@github.com:a/b");
                assert_eq!(args.target_ref, "main");
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn parses_sync_flags_and_alias() {
        let cli = parse(&["workset", "up", "--fetch-detached", "--lock-timeout", "30"]);
        match cli.command {
            Commands::Sync(args) => {
                assert!(args.fetch_detached);
                assert_eq!(args.lock_timeout, Some(30));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn parses_status_all_short_flag() {
        let cli = parse(&["workset", "status", "-a"]);
        match cli.command {
            Commands::Status(args) => assert!(args.all),
            _ => panic!("expected status"),
        }
    }
}
