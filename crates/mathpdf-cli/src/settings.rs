//! Settings command implementation for mathpdf CLI.

use std::path::{Path, PathBuf};

use mathpdf_core::EnhanceConfig;

use crate::colors;

/// Settings file used when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "mathpdf.json";

pub fn resolve(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

/// Write the default settings.
pub fn init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = resolve(path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }

    EnhanceConfig::default().save(&path)?;
    println!(
        "{}Wrote{} default settings to {}",
        colors::GREEN,
        colors::RESET,
        path.display()
    );
    Ok(())
}

/// Print the settings that `enhance` would use.
pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let path = resolve(path);
    if !path.exists() {
        eprintln!(
            "{}No settings file at {}; showing defaults{}",
            colors::DIM,
            path.display(),
            colors::RESET
        );
    }

    let config = EnhanceConfig::load_or_default(&path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    eprintln!(
        "{}side: {}{}",
        colors::DIM,
        config.side.description(),
        colors::RESET
    );
    Ok(())
}
