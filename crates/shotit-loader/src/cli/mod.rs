use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser, Default)]
#[command(
    name = "shotit-loader",
    version,
    author,
    about = "Loads per-frame hash artifacts into the shotit vector index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to the job dispatcher and load jobs until interrupted.
    Run(RunArgs),
    /// Load a single `<collectionID>/<fileName>` without the dispatcher.
    Load(LoadArgs),
    /// Flush the configured collection once.
    Flush(FlushArgs),
    /// Drop and recreate the configured collection.
    InitCollection(InitCollectionArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Skip the daily maintenance flush even when enabled in configuration.
    #[arg(long)]
    pub no_maintenance: bool,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Job file in the form `<collectionID>/<fileName>`.
    #[arg(value_name = "FILE")]
    pub file: String,
}

#[derive(Debug, Args)]
pub struct FlushArgs {}

#[derive(Debug, Args)]
pub struct InitCollectionArgs {
    /// Confirm that existing vectors in the collection will be discarded.
    #[arg(long)]
    pub yes: bool,
}
