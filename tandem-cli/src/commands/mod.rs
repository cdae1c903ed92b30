pub mod init;
pub mod mappings;
pub mod run;

use std::path::PathBuf;

use clap::Args;

use tandem_core::config::DEFAULT_DATABASE;

/// Location of the mapping database, shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArg {
    /// Path to the SQLite mapping store.
    #[arg(long = "db", env = "TANDEM_DB", default_value = DEFAULT_DATABASE, value_name = "PATH")]
    pub path: PathBuf,
}
