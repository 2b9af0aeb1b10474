use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dsync")]
#[command(version)]
#[command(about = "Compare, export, import and sync Directus configuration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Exit non-zero when any item fails to apply
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the selectable tree of the local instance
    Tree {
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export selected local items to a manifest
    Export(ExportArgs),

    /// Compare a manifest against the local instance
    Compare {
        /// Manifest file
        file: PathBuf,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a manifest into the local instance
    Import(ImportArgs),

    /// Compare and sync with a remote instance
    #[command(subcommand)]
    Remote(RemoteCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Item selection shared by export, push and pull
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SelectArgs {
    /// Items to include, as kind:id (collection:articles, flow:<uuid>, role:<uuid>, policy:<uuid>)
    #[arg(short, long = "select", value_name = "ID", num_args = 1..)]
    pub select: Vec<String>,

    /// Include every item
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub selection: SelectArgs,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Manifest file
    pub file: PathBuf,

    /// Items to import (default: new and modified items)
    #[arg(short, long = "select", value_name = "ID", num_args = 1..)]
    pub select: Vec<String>,

    #[command(flatten)]
    pub apply: ApplyArgs,
}

/// Flags shared by every command that writes
#[derive(Args, Debug, Clone, Copy)]
pub struct ApplyArgs {
    /// Show the plan without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Which remote to talk to
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Remote name from config.toml
    #[arg(required_unless_present = "url", conflicts_with = "url")]
    pub name: Option<String>,

    /// Remote base URL (ad hoc, instead of a name)
    #[arg(long, requires = "token")]
    pub url: Option<String>,

    /// Remote static token
    #[arg(long, env = "DSYNC_REMOTE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum RemoteCommand {
    /// Check that the remote is reachable and the token works
    Test {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Compare the local instance with the remote
    Scan {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,

        /// Show a diff of the normalized items that differ
        #[arg(long)]
        details: bool,
    },

    /// Copy selected local items to the remote
    Push {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(flatten)]
        selection: SelectArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },

    /// Copy selected remote items to the local instance
    Pull {
        #[command(flatten)]
        remote: RemoteArgs,

        #[command(flatten)]
        selection: SelectArgs,

        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the config file location and connections
    Show,

    /// Validate the config file
    Validate,
}
