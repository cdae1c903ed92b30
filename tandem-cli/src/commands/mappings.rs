//! `tandem mappings` — what is linked to what, and when it last synced.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tandem_core::Mapping;
use tandem_sync::MappingStore;

use super::DatabaseArg;

/// Arguments for `tandem mappings`.
#[derive(Args, Debug)]
pub struct MappingsArgs {
    #[command(flatten)]
    pub database: DatabaseArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl MappingsArgs {
    pub fn run(self) -> Result<()> {
        let path = &self.database.path;
        if !path.exists() {
            bail!(
                "no mapping store at {} — run `tandem init` first",
                path.display()
            );
        }
        let store = MappingStore::open(path)
            .with_context(|| format!("failed to open mapping store at {}", path.display()))?;
        let mappings = store.list().context("failed to read mappings")?;

        if self.json {
            print_json(&mappings)?;
        } else {
            print_table(mappings);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct MappingsJson<'a> {
    count: usize,
    mappings: &'a [Mapping],
}

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "issue")]
    issue: String,
    #[tabled(rename = "task")]
    task: String,
    #[tabled(rename = "from tracker")]
    from_tracker: String,
    #[tabled(rename = "from board")]
    from_board: String,
}

fn print_json(mappings: &[Mapping]) -> Result<()> {
    let payload = MappingsJson {
        count: mappings.len(),
        mappings,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize mappings JSON")?
    );
    Ok(())
}

fn print_table(mappings: Vec<Mapping>) {
    println!("{} mapping(s)", mappings.len().to_string().bold());
    if mappings.is_empty() {
        println!("{}", "Nothing synced yet.".bright_black());
        return;
    }

    let rows: Vec<MappingRow> = mappings
        .into_iter()
        .map(|mapping| MappingRow {
            issue: format!("#{}", mapping.tracker_id),
            task: mapping.board_id.0,
            from_tracker: age(mapping.last_synced_from_tracker),
            from_board: age(mapping.last_synced_from_board),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn age(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(at) => {
            let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0) as u64;
            format!("{} ago", format_seconds(seconds))
        }
        None => "never".to_string(),
    }
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
