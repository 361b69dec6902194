//! Content Cache
//!
//! Durable copies of fetched marketplace trees (`marketplaces/<name>`) and of
//! externally sourced plugins (`plugin-cache/<marketplace>/<plugin>`).
//!
//! A store copies into a sibling staging directory and swaps it into place.
//! The copy itself is not atomic; a partial tree surfaces later as a load
//! error, never as a panic.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PluginMarketError, Result};
use crate::plugin::types::validate_name;

const MARKETPLACES_DIR: &str = "marketplaces";
const PLUGIN_CACHE_DIR: &str = "plugin-cache";

pub trait ContentCache {
    /// Location of a marketplace tree (whether or not it exists)
    fn marketplace_path(&self, name: &str) -> PathBuf;

    /// Copy `source` into the marketplace cache, replacing any previous copy
    fn store_marketplace(&self, name: &str, source: &Path) -> Result<PathBuf>;

    /// Delete a marketplace tree; absent is not an error
    fn delete_marketplace(&self, name: &str) -> Result<()>;

    /// Location of a plugin cache entry (whether or not it exists).
    /// Names that would escape the cache root are rejected.
    fn plugin_path(&self, marketplace: &str, plugin: &str) -> Result<PathBuf>;

    /// Copy `source` into the plugin cache, replacing any previous copy
    fn store_plugin(&self, marketplace: &str, plugin: &str, source: &Path) -> Result<PathBuf>;

    /// Delete a plugin cache entry. Returns whether anything was removed.
    fn delete_plugin(&self, marketplace: &str, plugin: &str) -> Result<bool>;
}

/// Filesystem cache under a plugins directory
#[derive(Debug, Clone)]
pub struct DirCache {
    marketplaces_dir: PathBuf,
    plugin_cache_dir: PathBuf,
}

impl DirCache {
    pub fn new(plugins_dir: &Path) -> Self {
        Self {
            marketplaces_dir: plugins_dir.join(MARKETPLACES_DIR),
            plugin_cache_dir: plugins_dir.join(PLUGIN_CACHE_DIR),
        }
    }
}

impl ContentCache for DirCache {
    fn marketplace_path(&self, name: &str) -> PathBuf {
        self.marketplaces_dir.join(name)
    }

    fn store_marketplace(&self, name: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.marketplace_path(name);
        replace_dir(source, &dest)?;
        Ok(dest)
    }

    fn delete_marketplace(&self, name: &str) -> Result<()> {
        remove_dir_if_exists(&self.marketplace_path(name))?;
        Ok(())
    }

    fn plugin_path(&self, marketplace: &str, plugin: &str) -> Result<PathBuf> {
        validate_name(marketplace)?;
        validate_name(plugin)?;
        Ok(self.plugin_cache_dir.join(marketplace).join(plugin))
    }

    fn store_plugin(&self, marketplace: &str, plugin: &str, source: &Path) -> Result<PathBuf> {
        let dest = self.plugin_path(marketplace, plugin)?;
        replace_dir(source, &dest)?;
        Ok(dest)
    }

    fn delete_plugin(&self, marketplace: &str, plugin: &str) -> Result<bool> {
        remove_dir_if_exists(&self.plugin_path(marketplace, plugin)?)
    }
}

/// Copy `src` to a staging directory next to `dest`, then swap it in
fn replace_dir(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(PluginMarketError::load(src, "source is not a directory"));
    }

    let parent = dest.parent().unwrap_or(dest);
    fs::create_dir_all(parent)?;

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let staging = parent.join(format!(".{}.staging-{}", file_name, uuid::Uuid::new_v4()));

    debug!(src = %src.display(), dest = %dest.display(), "caching directory");

    if let Err(e) = copy_dir_recursive(src, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    remove_dir_if_exists(dest)?;
    fs::rename(&staging, dest)?;

    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
        return Ok(true);
    }
    Ok(false)
}

/// Copy directory recursively, skipping `.git`
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| PluginMarketError::load(src, e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| PluginMarketError::load(entry.path(), e))?;
        let dst_path = dst.join(relative);

        if entry.path().is_dir() {
            fs::create_dir_all(&dst_path)?;
        } else if entry.path().is_file() {
            if let Some(parent) = dst_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (DirCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DirCache::new(temp_dir.path());
        (cache, temp_dir)
    }

    fn create_source(temp: &TempDir) -> PathBuf {
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("subdir")).unwrap();
        fs::create_dir_all(src.join(".git")).unwrap();
        fs::write(src.join(".git/config"), "git config").unwrap();
        fs::write(src.join("file1.txt"), "content1").unwrap();
        fs::write(src.join("subdir/file2.txt"), "content2").unwrap();
        src
    }

    #[test]
    fn test_layout() {
        let (cache, temp) = create_test_cache();
        assert_eq!(
            cache.marketplace_path("m"),
            temp.path().join("marketplaces/m")
        );
        assert_eq!(
            cache.plugin_path("m", "p").unwrap(),
            temp.path().join("plugin-cache/m/p")
        );
    }

    #[test]
    fn test_store_marketplace_copies_tree_without_git() {
        let (cache, temp) = create_test_cache();
        let src = create_source(&temp);

        let dest = cache.store_marketplace("market", &src).unwrap();

        assert_eq!(fs::read_to_string(dest.join("file1.txt")).unwrap(), "content1");
        assert!(dest.join("subdir/file2.txt").exists());
        assert!(!dest.join(".git").exists());
    }

    #[test]
    fn test_store_replaces_previous_copy() {
        let (cache, temp) = create_test_cache();
        let src = create_source(&temp);

        let dest = cache.store_plugin("market", "plugin", &src).unwrap();
        fs::write(dest.join("stale.txt"), "stale").unwrap();

        cache.store_plugin("market", "plugin", &src).unwrap();
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("file1.txt").exists());

        // No staging directories left behind
        let siblings: Vec<_> = fs::read_dir(dest.parent().unwrap()).unwrap().collect();
        assert_eq!(siblings.len(), 1);
    }

    #[test]
    fn test_store_missing_source_fails() {
        let (cache, temp) = create_test_cache();
        let result = cache.store_marketplace("market", &temp.path().join("missing"));
        assert!(result.is_err());
        assert!(!cache.marketplace_path("market").exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (cache, temp) = create_test_cache();
        let src = create_source(&temp);

        cache.store_plugin("market", "plugin", &src).unwrap();
        assert!(cache.delete_plugin("market", "plugin").unwrap());
        assert!(!cache.delete_plugin("market", "plugin").unwrap());

        cache.store_marketplace("market", &src).unwrap();
        cache.delete_marketplace("market").unwrap();
        cache.delete_marketplace("market").unwrap();
        assert!(!cache.marketplace_path("market").exists());
    }

    #[test]
    fn test_plugin_names_cannot_escape_cache_root() {
        let (cache, temp) = create_test_cache();
        let src = create_source(&temp);

        cache.store_plugin("market", "kept", &src).unwrap();
        fs::create_dir_all(temp.path().join("outside")).unwrap();

        for (marketplace, plugin) in [("market", ".."), ("market", "../../outside"), ("..", "x")] {
            assert!(matches!(
                cache.delete_plugin(marketplace, plugin),
                Err(PluginMarketError::InvalidName { .. })
            ));
            assert!(cache.store_plugin(marketplace, plugin, &src).is_err());
            assert!(cache.plugin_path(marketplace, plugin).is_err());
        }

        assert!(cache.plugin_path("market", "kept").unwrap().join("file1.txt").exists());
        assert!(temp.path().join("outside").exists());
    }
}
