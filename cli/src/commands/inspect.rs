//! `layerforge inspect` command - List the entries of a layer file.

use std::path::PathBuf;

use clap::Args;
use layerforge_runtime::{list_layer_entries, EntryKind};

use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Exported layer file (<digest>.tgz)
    pub layer: PathBuf,

    /// Output entries as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let entries = list_layer_entries(&args.layer)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let mut table = output::new_table(&["MODE", "SIZE", "PATH"]);
    let mut total = 0;
    for entry in &entries {
        total += entry.size;
        table.add_row([
            output::format_mode(entry.kind, entry.mode),
            output::format_bytes(entry.size),
            entry.path.display().to_string(),
        ]);
    }
    println!("{table}");

    let files = entries
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .count();
    println!(
        "{} entries, {} files, {}",
        entries.len(),
        files,
        output::format_bytes(total)
    );

    Ok(())
}
