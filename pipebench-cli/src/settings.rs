//! Local settings file
//!
//! Target addresses and credentials live in a dotenv file next to the
//! binary's working directory. A default one is written on first run so the
//! tool works out of the box against three local stores.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Written when no settings file exists yet
pub const DEFAULT_SETTINGS: &str = "\
DRAGONFLY_ADDR=localhost:6379
KEYDB_ADDR=localhost:6380
REDIS_ADDR=localhost:6381
REDIS_PASSWORD=your_password_here
";

/// Password value in the default file; treated as "no password"
pub const PLACEHOLDER_PASSWORD: &str = "your_password_here";

/// Create the settings file with defaults if it does not exist
///
/// Returns `true` if the file was created. An existing file is never touched.
pub fn ensure_settings_file(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(DEFAULT_SETTINGS.as_bytes())
                .with_context(|| format!("Failed to write settings file {}", path.display()))?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e)
            .with_context(|| format!("Failed to create settings file {}", path.display())),
    }
}

/// Load the settings file into the process environment
///
/// Variables already present in the environment win over the file.
pub fn load_settings(path: &Path) -> Result<()> {
    dotenvy::from_path(path)
        .with_context(|| format!("Failed to load settings file {}", path.display()))
}

/// Create the settings file if needed, then load it
pub fn prepare(path: &Path) -> Result<bool> {
    let created = ensure_settings_file(path)?;
    load_settings(path)?;
    Ok(created)
}
