use std::path::PathBuf;

use anyhow::Result;
use photolog_core::PhotoLog;

pub fn import(log: &mut PhotoLog, path: PathBuf) -> Result<()> {
    let count = log.import_table(&path)?;
    println!("Imported {count} observations from {}", path.display());
    Ok(())
}

pub fn export(log: &PhotoLog, path: PathBuf) -> Result<()> {
    let count = log.export_table(&path)?;
    println!("Exported {count} observations to {}", path.display());
    Ok(())
}
