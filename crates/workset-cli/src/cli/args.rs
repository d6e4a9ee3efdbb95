use super::*;

#[derive(Parser)]
#[command(author, version, about = "Keep a working set of repositories synced")]
pub(super) struct Cli {
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Create a workset root")]
    Init(InitArgs),
    #[command(about = "Add or update a repository in the manifest")]
    Add(AddArgs),
    #[command(about = "Clone, pull and check out everything in the manifest", alias = "up")]
    Sync(SyncArgs),
    #[command(about = "Show working-tree status for manifest repositories")]
    Status(StatusArgs),
    #[command(about = "List repository working directories")]
    Ls(LsArgs),
    #[command(about = "Print the workspace root")]
    Root,
}

#[derive(Parser)]
pub(super) struct InitArgs {
    #[arg(long, help = "Directory to initialize instead of the current one")]
    pub(super) root: Option<PathBuf>,
}

#[derive(Parser)]
pub(super) struct AddArgs {
    pub(super) repo: String,
    #[arg(long = "ref", default_value = "main", help = "Ref to keep checked out")]
    pub(super) target_ref: String,
}

#[derive(Parser)]
pub(super) struct SyncArgs {
    #[arg(
        long,
        help = "Fetch remotes even for repos sitting on a detached checkout"
    )]
    pub(super) fetch_detached: bool,
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Give up on a repo directory lock after this many seconds"
    )]
    pub(super) lock_timeout: Option<u64>,
}

#[derive(Parser)]
pub(super) struct StatusArgs {
    #[arg(
        short,
        long,
        help = "Show all repositories, not just those with changes"
    )]
    pub(super) all: bool,
}

#[derive(Parser)]
pub(super) struct LsArgs {
    pub(super) pattern: Option<String>,
}
