//! JSON state file helpers
//!
//! Readers never observe a half-written file: every write lands in a
//! temporary file next to the target and is renamed over it.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{PluginMarketError, Result};

/// Write `content` to `path` atomically, creating parent directories
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PluginMarketError::Io(e.error))?;

    Ok(())
}

/// Load a JSON file, or `None` when it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|e| PluginMarketError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(Some(value))
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| PluginMarketError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    atomic_write(path, &content)
}
