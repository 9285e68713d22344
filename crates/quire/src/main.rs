//! quire CLI - versioned page storage.
//!
//! Provides commands for reading and writing pages (`get`, `put`, `info`,
//! `history`, `list`, `search`), removing and renaming them (`delete`,
//! `delete-version`, `move`), and managing attachments (`attachment`).

mod commands;
mod error;
mod output;
mod registry;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{
    AttachmentCommand, DeleteArgs, DeleteVersionArgs, GetArgs, GlobalArgs, HistoryArgs, InfoArgs,
    ListArgs, MoveArgs, PutArgs, SearchArgs, Store,
};
use error::CliError;
use output::Output;

/// quire - versioned page storage.
#[derive(Parser)]
#[command(name = "quire", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the text of a page.
    Get(GetArgs),
    /// Save a new revision of a page.
    Put(PutArgs),
    /// Show page metadata.
    Info(InfoArgs),
    /// List every revision of a page.
    History(HistoryArgs),
    /// List pages.
    List(ListArgs),
    /// Search page contents.
    Search(SearchArgs),
    /// Delete a page.
    Delete(DeleteArgs),
    /// Delete one revision of a page.
    DeleteVersion(DeleteVersionArgs),
    /// Rename a page.
    Move(MoveArgs),
    /// Attachment commands.
    #[command(subcommand)]
    Attachment(AttachmentCommand),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.global.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let store = Store::open(&cli.global)?;
    match cli.command {
        Commands::Get(args) => args.execute(&store),
        Commands::Put(args) => args.execute(&store),
        Commands::Info(args) => args.execute(&store),
        Commands::History(args) => args.execute(&store),
        Commands::List(args) => args.execute(&store),
        Commands::Search(args) => args.execute(&store),
        Commands::Delete(args) => args.execute(&store),
        Commands::DeleteVersion(args) => args.execute(&store),
        Commands::Move(args) => args.execute(&store),
        Commands::Attachment(cmd) => cmd.execute(&store),
    }
}
