//! Settings Ledger
//!
//! One ledger per scope, stored under `enabledPlugins` in that scope's
//! settings.json. Every other key in the file is preserved on write.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PluginMarketError, Result};
use crate::plugin::store::{read_json, write_json};
use crate::plugin::types::EnabledPlugins;

const ENABLED_PLUGINS_KEY: &str = "enabledPlugins";

pub trait SettingsLedger {
    fn load_enabled_plugins(&self) -> Result<EnabledPlugins>;

    fn save_enabled_plugins(&self, plugins: &EnabledPlugins) -> Result<()>;
}

/// Read-modify-write transaction over one scope's ledger.
///
/// Nothing is written when `update` returns an error.
pub fn update_ledger<T>(
    ledger: &dyn SettingsLedger,
    update: impl FnOnce(&mut EnabledPlugins) -> Result<T>,
) -> Result<T> {
    let mut snapshot = ledger.load_enabled_plugins()?;
    let out = update(&mut snapshot)?;
    ledger.save_enabled_plugins(&snapshot)?;
    Ok(out)
}

/// A Claude-style settings.json file
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// <project>/.claude/settings.json
    pub fn project(root: &Path) -> Self {
        Self::new(root.join(".claude").join("settings.json"))
    }

    /// <project>/.claude/settings.local.json
    pub fn local(root: &Path) -> Self {
        Self::new(root.join(".claude").join("settings.local.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> Result<Map<String, Value>> {
        match read_json::<Value>(&self.path)? {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(self.parse_error("settings root must be an object")),
        }
    }

    fn parse_error(&self, message: &str) -> PluginMarketError {
        PluginMarketError::ConfigParse {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl SettingsLedger for SettingsFile {
    fn load_enabled_plugins(&self) -> Result<EnabledPlugins> {
        let document = self.load_document()?;

        let entries = match document.get(ENABLED_PLUGINS_KEY) {
            None | Some(Value::Null) => return Ok(EnabledPlugins::new()),
            Some(Value::Object(entries)) => entries,
            Some(_) => return Err(self.parse_error("enabledPlugins must be an object")),
        };

        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), is_truthy(value)))
            .collect())
    }

    fn save_enabled_plugins(&self, plugins: &EnabledPlugins) -> Result<()> {
        let mut document = self.load_document()?;

        let entries: Map<String, Value> = plugins
            .iter()
            .map(|(key, enabled)| (key.clone(), Value::Bool(*enabled)))
            .collect();
        document.insert(ENABLED_PLUGINS_KEY.to_string(), Value::Object(entries));

        debug!(path = %self.path.display(), count = plugins.len(), "writing settings ledger");
        write_json(&self.path, &Value::Object(document))
    }
}

/// Non-boolean ledger values written by hand are read loosely
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scope_paths() {
        let root = Path::new("/work/project");
        assert_eq!(
            SettingsFile::project(root).path(),
            Path::new("/work/project/.claude/settings.json")
        );
        assert_eq!(
            SettingsFile::local(root).path(),
            Path::new("/work/project/.claude/settings.local.json")
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsFile::project(temp.path());
        assert!(settings.load_enabled_plugins().unwrap().is_empty());
    }

    #[test]
    fn test_save_preserves_other_keys() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsFile::project(temp.path());
        fs::create_dir_all(temp.path().join(".claude")).unwrap();
        fs::write(
            settings.path(),
            r#"{"theme": "dark", "permissions": {"allow": ["Bash"]}}"#,
        )
        .unwrap();

        let mut plugins = EnabledPlugins::new();
        plugins.insert("p@m".to_string(), true);
        settings.save_enabled_plugins(&plugins).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(settings.path()).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["permissions"]["allow"][0], "Bash");
        assert_eq!(raw["enabledPlugins"]["p@m"], true);
    }

    #[test]
    fn test_non_bool_values_are_read_loosely() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsFile::new(temp.path().join("settings.json"));
        fs::write(
            settings.path(),
            r#"{"enabledPlugins": {"a@m": 1, "b@m": 0, "c@m": "yes", "d@m": null}}"#,
        )
        .unwrap();

        let plugins = settings.load_enabled_plugins().unwrap();
        assert_eq!(plugins["a@m"], true);
        assert_eq!(plugins["b@m"], false);
        assert_eq!(plugins["c@m"], true);
        assert_eq!(plugins["d@m"], false);
    }

    #[test]
    fn test_malformed_settings_is_an_error() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsFile::new(temp.path().join("settings.json"));

        fs::write(settings.path(), "[1, 2]").unwrap();
        assert!(settings.load_enabled_plugins().is_err());

        fs::write(settings.path(), r#"{"enabledPlugins": ["a@m"]}"#).unwrap();
        assert!(matches!(
            settings.load_enabled_plugins(),
            Err(PluginMarketError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_update_ledger() {
        let temp = TempDir::new().unwrap();
        let settings = SettingsFile::local(temp.path());

        update_ledger(&settings, |plugins| {
            plugins.insert("a@m".to_string(), true);
            plugins.insert("b@m".to_string(), false);
            Ok(())
        })
        .unwrap();

        let result: Result<()> = update_ledger(&settings, |plugins| {
            plugins.clear();
            Err(PluginMarketError::NotInstalled {
                key: "x@m".to_string(),
            })
        });
        assert!(result.is_err());

        let plugins = settings.load_enabled_plugins().unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins["b@m"], false);
    }
}
