//! Manifest Loader
//!
//! Reads marketplace.json / plugin.json and answers catalog queries over a
//! parsed marketplace.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{PluginMarketError, Result};
use crate::plugin::types::{MarketplaceManifest, PluginEntry, PluginManifest, ResolvedPlugin};

pub const MARKETPLACE_FILE: &str = ".claude-plugin/marketplace.json";
pub const PLUGIN_FILE: &str = ".claude-plugin/plugin.json";

/// Load marketplace.json from the file itself or from a directory containing it
pub fn load_marketplace_manifest(path: &Path) -> Result<MarketplaceManifest> {
    load_manifest(&manifest_path(path, MARKETPLACE_FILE))
}

/// Load plugin.json from the file itself or from a directory containing it
pub fn load_plugin_manifest(path: &Path) -> Result<PluginManifest> {
    load_manifest(&manifest_path(path, PLUGIN_FILE))
}

/// Like [`load_plugin_manifest`], but a missing file is `None`
pub fn load_optional_plugin_manifest(dir: &Path) -> Result<Option<PluginManifest>> {
    let path = manifest_path(dir, PLUGIN_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    load_manifest(&path).map(Some)
}

/// Parse marketplace.json from a string
pub fn parse_marketplace_str(content: &str) -> Result<MarketplaceManifest> {
    serde_json::from_str(content).map_err(|e| PluginMarketError::load("<string>", e))
}

fn manifest_path(path: &Path, conventional: &str) -> PathBuf {
    if path.is_dir() {
        path.join(conventional)
    } else {
        path.to_path_buf()
    }
}

fn load_manifest<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(PluginMarketError::load(path, "manifest not found"));
    }

    let content = fs::read_to_string(path).map_err(|e| PluginMarketError::load(path, e))?;
    serde_json::from_str(&content).map_err(|e| PluginMarketError::load(path, e))
}

/// Search plugins in a marketplace
pub fn search_plugins(
    manifest: &MarketplaceManifest,
    marketplace: &str,
    query: &str,
) -> Vec<ResolvedPlugin> {
    let query_lower = query.to_lowercase();

    manifest
        .plugins
        .iter()
        .filter(|p| matches_query(p, &query_lower))
        .map(|p| ResolvedPlugin::from_entry(p, marketplace))
        .collect()
}

/// Case-insensitive substring match; `query` must already be lowercase
pub fn matches_query(plugin: &PluginEntry, query: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(query);

    contains(plugin.name.as_str())
        || plugin.description.as_deref().is_some_and(contains)
        || plugin.category.as_deref().is_some_and(contains)
        || plugin.tags.iter().any(|t| contains(t.as_str()))
        || plugin.keywords.iter().any(|k| contains(k.as_str()))
}

/// List all plugins in a marketplace
pub fn list_plugins(manifest: &MarketplaceManifest, marketplace: &str) -> Vec<ResolvedPlugin> {
    manifest
        .plugins
        .iter()
        .map(|p| ResolvedPlugin::from_entry(p, marketplace))
        .collect()
}

/// Get a plugin by name from a marketplace
pub fn get_plugin(
    manifest: &MarketplaceManifest,
    marketplace: &str,
    name: &str,
) -> Option<ResolvedPlugin> {
    manifest
        .plugin(name)
        .map(|p| ResolvedPlugin::from_entry(p, marketplace))
}
