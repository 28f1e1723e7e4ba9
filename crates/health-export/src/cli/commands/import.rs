//! Import command for health

use std::io::Write;
use std::path::Path;

use crate::cli::{print_json, OutputFormat};
use crate::error::Result;
use crate::import::Importer;
use crate::parser::ExportSource;
use crate::storage;

/// Import an export.xml or export.zip into the database
pub fn run(db_path: &Path, export_path: &Path, batch_size: usize, format: OutputFormat) -> Result<()> {
    let mut source = ExportSource::open(export_path)?;
    let mut store = storage::open_or_create(db_path)?;

    let show_progress = format == OutputFormat::Table;
    if show_progress {
        println!("Using database: {}", db_path.display());
        println!("Importing {}...", source.describe());
    }

    let stats = Importer::new()
        .batch_size(batch_size)
        .on_progress(|stats| {
            if show_progress {
                eprint!(
                    "\r  {} entries read, {} new",
                    stats.processed, stats.inserted
                );
                let _ = std::io::stderr().flush();
            }
        })
        .import(&mut source, &mut store)?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            eprintln!();
            println!("\nImport complete: {}", stats);
            println!("{:<20} {:>12}", "Entries read", stats.processed);
            println!("{:<20} {:>12}", "Metadata stored", stats.metadata_inserted);
            println!("{:<20} {:>12}", "Activity days", stats.summaries);
        }
    }

    Ok(())
}
