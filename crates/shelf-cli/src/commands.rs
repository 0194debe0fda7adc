//! Subcommand implementations. Output goes to `out` as plain text.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use shelf_config::{log_cli_info, log_store_info, log_store_warn, Config};
use shelf_store::{Shelf, Shelvable, Value};

/// Write the default config to `path`. Existing files are kept unless `force`.
pub fn init(path: &Path, force: bool, out: &mut impl Write) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = Config::default_toml()?;
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;

    log_cli_info!("Wrote default config", path = path.display().to_string().as_str());
    writeln!(out, "Wrote default config to {}", path.display())?;
    Ok(())
}

pub fn put(shelf: &Shelf, name: &str, value: Value, out: &mut impl Write) -> Result<()> {
    let kind = value.type_tag();
    shelf
        .put(name, value)
        .with_context(|| format!("Failed to store {}", name))?;
    writeln!(out, "{} ({})", name, kind)?;
    Ok(())
}

pub fn get(shelf: &Shelf, name: &str, out: &mut impl Write) -> Result<()> {
    let value = shelf
        .get(name)
        .with_context(|| format!("Failed to read {}", name))?;
    writeln!(out, "{}", value)?;
    Ok(())
}

pub fn list(shelf: &Shelf, out: &mut impl Write) -> Result<()> {
    for name in shelf.names() {
        match shelf.get(&name) {
            Ok(value) => writeln!(out, "{}\t{}\t{}", name, value.type_tag(), value)?,
            Err(e) => writeln!(out, "{}\t<unreadable: {}>", name, e)?,
        }
    }
    Ok(())
}

pub fn erase(shelf: &Shelf, name: &str, out: &mut impl Write) -> Result<()> {
    shelf
        .erase(name)
        .with_context(|| format!("Failed to erase {}", name))?;
    writeln!(out, "erased {}", name)?;
    Ok(())
}

/// Integer read-modify-commit
pub fn add(shelf: &Shelf, name: &str, delta: i64, out: &mut impl Write) -> Result<()> {
    let mut counter = shelf
        .open_value::<i64>(name)
        .with_context(|| format!("Failed to open integer {}", name))?;
    let Some(next) = counter.plus(delta) else {
        bail!("{} + {} overflows", counter.value(), delta);
    };
    counter.commit(next)?;
    writeln!(out, "{}", counter.value())?;
    Ok(())
}

pub fn stats(shelf: &Shelf, out: &mut impl Write) -> Result<()> {
    let stats = shelf.stats();
    writeln!(out, "root:      {}", shelf.directory().root().display())?;
    writeln!(out, "swap:      {}", shelf.directory().swap_strategy())?;
    writeln!(out, "segments:  {}", stats.segment_count)?;
    writeln!(out, "used:      {} bytes", stats.used_bytes)?;
    writeln!(out, "capacity:  {} bytes", stats.capacity_bytes)?;
    writeln!(out, "available: {} bytes", stats.available_bytes())?;
    Ok(())
}

pub fn sweep(shelf: &Shelf, out: &mut impl Write) -> Result<()> {
    let report = shelf.sweep().context("Sweep failed")?;
    if report.is_clean() {
        writeln!(out, "clean")?;
        return Ok(());
    }

    for name in &report.reclaimed {
        log_store_info!("Reclaimed segment", segment = name.as_str());
        writeln!(out, "reclaimed {}", name)?;
    }
    for name in &report.orphans {
        log_store_warn!("Orphan temp segment", segment = name.as_str());
        writeln!(out, "orphan    {}", name)?;
    }
    for (name, reason) in &report.corrupt {
        log_store_warn!("Corrupt segment", segment = name.as_str(), reason = reason.as_str());
        writeln!(out, "corrupt   {}: {}", name, reason)?;
    }
    Ok(())
}
