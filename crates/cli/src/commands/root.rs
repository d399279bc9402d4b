use std::path::PathBuf;

use anyhow::Result;
use photolog_core::PhotoLog;

pub fn set(log: &PhotoLog, path: PathBuf) -> Result<()> {
    let resolved = log.set_image_root(&path)?;
    println!("Image root set to: {}", resolved.display());
    Ok(())
}

pub fn show(log: &PhotoLog) -> Result<()> {
    match log.get_image_root()? {
        Some(path) => println!("Image root: {}", path.display()),
        None => println!("No image root configured. Use `photolog root set <path>` to set one."),
    }
    Ok(())
}
