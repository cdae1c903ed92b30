//! Tandem — keep GitHub issues and a Planner bucket in step.
//!
//! # Usage
//!
//! ```text
//! tandem run [--once] [--log-json] [--open-issues-only] [--db <path>]
//! tandem init [--db <path>]
//! tandem mappings [--db <path>] [--json]
//! ```
//!
//! Credentials and identifiers for `run` come from flags or the environment
//! (`GITHUB_TOKEN`, `GITHUB_REPO`, `PLAN_ID`, `BUCKET_ID`, `AZURE_TENANT_ID`,
//! `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, mappings::MappingsArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    version,
    about = "Two-way sync between GitHub issues and Microsoft Planner tasks",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run sync passes until interrupted (or once with `--once`).
    Run(RunArgs),

    /// Create the mapping store if it does not exist yet.
    Init(InitArgs),

    /// List stored issue/task mappings.
    Mappings(MappingsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Init(args) => args.run(),
        Commands::Mappings(args) => args.run(),
    }
}
