use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hive_core::{HistoryAction, ManifestKey};

#[derive(Parser)]
#[command(name = "hive", about = "Content-addressed application stores", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Node configuration file
    #[arg(short, long, global = true, default_value = "hive.toml")]
    pub config: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new hive
    Init(InitArgs),
    /// Store a file as a single object
    Put(PutArgs),
    /// Import a directory and publish it as a manifest
    Manifest(ManifestArgs),
    /// List the tags of a manifest name
    Tags(TagsArgs),
    /// Show a manifest and its root tree
    Show(ShowArgs),
    /// Write a manifest's tree to a directory
    Export(ExportArgs),
    /// Delete a manifest entry
    Delete(DeleteArgs),
    /// Show or append to an instance history
    History(HistoryArgs),
    /// Show or count client usage of an instance
    Usage(UsageArgs),
    /// Collect unreferenced objects across the configured storage roots
    Gc(GcArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct PutArgs {
    pub hive: PathBuf,
    pub file: PathBuf,
}

#[derive(Args)]
pub struct ManifestArgs {
    pub hive: PathBuf,
    /// `name:tag`
    pub key: ManifestKey,
    pub dir: PathBuf,
    /// `name=value`, repeatable
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
}

#[derive(Args)]
pub struct TagsArgs {
    pub hive: PathBuf,
    /// List every name when omitted
    pub name: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub hive: PathBuf,
    pub key: ManifestKey,
}

#[derive(Args)]
pub struct ExportArgs {
    pub hive: PathBuf,
    pub key: ManifestKey,
    pub dest: PathBuf,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub hive: PathBuf,
    pub key: ManifestKey,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub hive: PathBuf,
    pub key: ManifestKey,
    /// Append an event instead of listing
    #[arg(long)]
    pub record: Option<ActionArg>,
    #[arg(long, default_value = "hive")]
    pub user: String,
    #[arg(long, default_value = "")]
    pub comment: String,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ActionArg {
    Create,
    Install,
    Uninstall,
    Activate,
    Deactivate,
}

impl From<ActionArg> for HistoryAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Create => HistoryAction::Create,
            ActionArg::Install => HistoryAction::Install,
            ActionArg::Uninstall => HistoryAction::Uninstall,
            ActionArg::Activate => HistoryAction::Activate,
            ActionArg::Deactivate => HistoryAction::Deactivate,
        }
    }
}

#[derive(Args)]
pub struct UsageArgs {
    pub hive: PathBuf,
    pub key: ManifestKey,
    /// Count one use by this application today
    #[arg(long, requires = "host")]
    pub app: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args)]
pub struct GcArgs {
    /// Report what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,
    /// Keep running on the configured schedule
    #[arg(long)]
    pub watch: bool,
}
