//! `tandem init [--db <path>]`

use anyhow::{Context, Result};
use clap::Args;

use tandem_sync::MappingStore;

use super::DatabaseArg;

/// Create the mapping store.
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub database: DatabaseArg,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let path = &self.database.path;
        let store = MappingStore::open(path)
            .with_context(|| format!("failed to create mapping store at {}", path.display()))?;
        let existing = store.list().context("failed to read mappings")?.len();

        println!("✓ Mapping store ready at {}", path.display());
        println!("  {existing} mapping(s) recorded");
        Ok(())
    }
}
