//! Marketplace Registry
//!
//! Manages known_marketplaces.json. Entries are never edited in place:
//! every change loads a snapshot, updates a private copy and writes the
//! whole map back.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::plugin::store::{read_json, write_json};
use crate::plugin::types::KnownMarketplaces;

const KNOWN_MARKETPLACES_FILE: &str = "known_marketplaces.json";

/// Durable name -> entry map
pub trait RegistryStore {
    /// Full snapshot of the registry
    fn load_marketplaces(&self) -> Result<KnownMarketplaces>;

    /// Replace the whole registry atomically
    fn save_marketplaces(&self, marketplaces: &KnownMarketplaces) -> Result<()>;
}

/// Read-modify-write transaction over a registry.
///
/// Nothing is written when `update` returns an error.
pub fn update_registry<T>(
    store: &dyn RegistryStore,
    update: impl FnOnce(&mut KnownMarketplaces) -> Result<T>,
) -> Result<T> {
    let mut snapshot = store.load_marketplaces()?;
    let out = update(&mut snapshot)?;
    store.save_marketplaces(&snapshot)?;
    Ok(out)
}

/// Plugin Registry - the registry and blocklist files under a plugins directory
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    /// Base directory (~/.claude/plugins)
    plugins_dir: PathBuf,
}

impl PluginRegistry {
    /// Create with custom plugins directory
    pub fn with_dir(plugins_dir: PathBuf) -> Self {
        Self { plugins_dir }
    }

    /// Get the plugins directory path
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Path of known_marketplaces.json
    pub fn registry_file(&self) -> PathBuf {
        self.plugins_dir.join(KNOWN_MARKETPLACES_FILE)
    }
}

impl RegistryStore for PluginRegistry {
    fn load_marketplaces(&self) -> Result<KnownMarketplaces> {
        let marketplaces = read_json(&self.registry_file())?.unwrap_or_default();
        Ok(marketplaces)
    }

    fn save_marketplaces(&self, marketplaces: &KnownMarketplaces) -> Result<()> {
        let path = self.registry_file();
        debug!(path = %path.display(), count = marketplaces.len(), "writing marketplace registry");
        write_json(&path, marketplaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginMarketError;
    use crate::plugin::types::{MarketplaceSource, RegistryEntry};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn create_test_registry() -> (PluginRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = PluginRegistry::with_dir(temp_dir.path().to_path_buf());
        (registry, temp_dir)
    }

    fn github_entry(temp: &TempDir, repo: &str) -> RegistryEntry {
        RegistryEntry {
            source: MarketplaceSource::Github {
                repo: repo.to_string(),
                r#ref: None,
                sha: None,
            },
            install_location: temp.path().join("marketplaces/test"),
            last_updated: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (registry, _temp) = create_test_registry();
        assert!(registry.load_marketplaces().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let (registry, temp) = create_test_registry();

        let mut marketplaces = KnownMarketplaces::new();
        marketplaces.insert("test-mkt".to_string(), github_entry(&temp, "owner/repo"));
        registry.save_marketplaces(&marketplaces).unwrap();

        let loaded = registry.load_marketplaces().unwrap();
        assert_eq!(loaded, marketplaces);
        assert!(matches!(
            &loaded["test-mkt"].source,
            MarketplaceSource::Github { repo, .. } if repo == "owner/repo"
        ));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (registry, _temp) = create_test_registry();
        fs::write(registry.registry_file(), "not json").unwrap();

        assert!(matches!(
            registry.load_marketplaces(),
            Err(PluginMarketError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_update_registry_commits() {
        let (registry, temp) = create_test_registry();

        update_registry(&registry, |m| {
            m.insert("market1".to_string(), github_entry(&temp, "user/repo1"));
            m.insert("market2".to_string(), github_entry(&temp, "user/repo2"));
            Ok(())
        })
        .unwrap();

        let removed = update_registry(&registry, |m| Ok(m.remove("market1").is_some())).unwrap();
        assert!(removed);

        let loaded = registry.load_marketplaces().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("market2"));
    }

    #[test]
    fn test_update_registry_rejection_writes_nothing() {
        let (registry, temp) = create_test_registry();

        let result: Result<()> = update_registry(&registry, |m| {
            m.insert("market".to_string(), github_entry(&temp, "user/repo"));
            Err(PluginMarketError::MarketplaceNotFound {
                name: "market".to_string(),
            })
        });

        assert!(result.is_err());
        assert!(!registry.registry_file().exists());
    }
}
