//! Plugin Manager
//!
//! Reconciles the marketplace registry, the per-scope settings ledgers, the
//! content cache and the blocklist.
//!
//! Side effects are ordered so that an interrupted operation never leaves a
//! ledger entry without its plugin cache: caches are written before ledgers,
//! and deleted only after the last ledger entry referring to them is gone.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PluginMarketError, Result};
use crate::plugin::blocklist::BlocklistSource;
use crate::plugin::cache::{ContentCache, DirCache};
use crate::plugin::fetcher::{DefaultFetcher, Fetcher};
use crate::plugin::locate;
use crate::plugin::manifest::{self, load_marketplace_manifest, load_optional_plugin_manifest};
use crate::plugin::registry::{update_registry, PluginRegistry, RegistryStore};
use crate::plugin::settings::{update_ledger, SettingsFile, SettingsLedger};
use crate::plugin::types::{
    validate_name, BlocklistFile, InstalledPlugin, KnownMarketplaces, MarketplaceManifest,
    MarketplaceSource, PluginKey, PluginSource, RegistryEntry, ResolvedPlugin, Scope, ScopeFilter,
    UpdateCheckResult,
};

/// Plugin Manager - the programmatic API over every plugin store
pub struct PluginManager {
    registry: Box<dyn RegistryStore>,
    blocklist: Box<dyn BlocklistSource>,
    cache: Box<dyn ContentCache>,
    settings: BTreeMap<Scope, Box<dyn SettingsLedger>>,
    fetcher: Box<dyn Fetcher>,
}

impl PluginManager {
    /// Filesystem stores rooted at `plugins_dir`, with no scopes configured
    pub fn new(plugins_dir: PathBuf, fetcher: Box<dyn Fetcher>) -> Self {
        let registry = PluginRegistry::with_dir(plugins_dir.clone());
        Self::with_stores(
            Box::new(registry.clone()),
            Box::new(registry),
            Box::new(DirCache::new(&plugins_dir)),
            fetcher,
        )
    }

    pub fn with_stores(
        registry: Box<dyn RegistryStore>,
        blocklist: Box<dyn BlocklistSource>,
        cache: Box<dyn ContentCache>,
        fetcher: Box<dyn Fetcher>,
    ) -> Self {
        Self {
            registry,
            blocklist,
            cache,
            settings: BTreeMap::new(),
            fetcher,
        }
    }

    /// Configure (or replace) the ledger backing `scope`
    pub fn with_scope(mut self, scope: Scope, ledger: Box<dyn SettingsLedger>) -> Self {
        self.settings.insert(scope, ledger);
        self
    }

    /// User scope always; project and local scopes when a project root is given
    pub fn from_config(config: &Config, project_root: Option<&Path>) -> Result<Self> {
        let fetcher = DefaultFetcher::new(config.fetch.git_timeout(), config.fetch.http_timeout())?;
        let mut manager = Self::new(config.plugins_dir()?, Box::new(fetcher)).with_scope(
            Scope::User,
            Box::new(SettingsFile::new(config.user_settings()?)),
        );

        if let Some(root) = project_root {
            manager = manager
                .with_scope(Scope::Project, Box::new(SettingsFile::project(root)))
                .with_scope(Scope::Local, Box::new(SettingsFile::local(root)));
        }

        Ok(manager)
    }

    pub fn configured_scopes(&self) -> Vec<Scope> {
        self.settings.keys().copied().collect()
    }

    fn ledger(&self, scope: Scope) -> Result<&dyn SettingsLedger> {
        self.settings
            .get(&scope)
            .map(|ledger| ledger.as_ref())
            .ok_or(PluginMarketError::ScopeNotConfigured { scope })
    }

    fn registry_entry(&self, name: &str) -> Result<RegistryEntry> {
        self.registry
            .load_marketplaces()?
            .remove(name)
            .ok_or_else(|| PluginMarketError::MarketplaceNotFound {
                name: name.to_string(),
            })
    }

    // ========== Marketplaces ==========

    pub fn list_marketplaces(&self) -> Result<KnownMarketplaces> {
        self.registry.load_marketplaces()
    }

    /// Add a marketplace from a free-form source string.
    ///
    /// Returns the registered name and the parsed manifest.
    pub fn add_marketplace(
        &self,
        source: &str,
        name: Option<&str>,
        git_ref: Option<&str>,
    ) -> Result<(String, MarketplaceManifest)> {
        let source = MarketplaceSource::detect(source).with_ref(git_ref);
        self.add_marketplace_source(source, name)
    }

    pub fn add_marketplace_source(
        &self,
        source: MarketplaceSource,
        name: Option<&str>,
    ) -> Result<(String, MarketplaceManifest)> {
        let source = match source {
            MarketplaceSource::Directory { path } => MarketplaceSource::Directory {
                path: path.canonicalize().unwrap_or(path),
            },
            other => other,
        };

        let fetched = self.fetcher.fetch(&source)?;
        let label = name.map(str::to_string).unwrap_or_else(|| source.source_id());
        let manifest = load_marketplace_manifest(fetched.path())
            .map_err(|e| manifest_invalid(&label, e))?;

        let name = name.map(str::to_string).unwrap_or_else(|| manifest.name.clone());
        validate_name(&name)?;

        let install_location = self.cache.store_marketplace(&name, fetched.path())?;
        drop(fetched);

        let entry = RegistryEntry {
            source,
            install_location,
            last_updated: Utc::now(),
        };
        let replaced = update_registry(self.registry.as_ref(), |marketplaces| {
            Ok(marketplaces.insert(name.clone(), entry).is_some())
        })?;

        if replaced {
            info!(marketplace = %name, "replaced existing marketplace");
        } else {
            info!(marketplace = %name, plugins = manifest.plugins.len(), "added marketplace");
        }

        Ok((name, manifest))
    }

    /// Delete the cached tree, then the registry entry
    pub fn remove_marketplace(&self, name: &str) -> Result<()> {
        self.registry_entry(name)?;

        self.cache.delete_marketplace(name)?;
        update_registry(self.registry.as_ref(), |marketplaces| {
            marketplaces
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| PluginMarketError::MarketplaceNotFound {
                    name: name.to_string(),
                })
        })?;

        info!(marketplace = %name, "removed marketplace");
        Ok(())
    }

    /// Re-fetch from the stored source and re-cache
    pub fn refresh_marketplace(&self, name: &str) -> Result<MarketplaceManifest> {
        let entry = self.registry_entry(name)?;

        let fetched = self.fetcher.fetch(&entry.source)?;
        let manifest =
            load_marketplace_manifest(fetched.path()).map_err(|e| manifest_invalid(name, e))?;
        let install_location = self.cache.store_marketplace(name, fetched.path())?;
        drop(fetched);

        let refreshed = RegistryEntry {
            source: entry.source,
            install_location,
            last_updated: Utc::now(),
        };
        update_registry(self.registry.as_ref(), |marketplaces| {
            match marketplaces.get_mut(name) {
                Some(slot) => {
                    *slot = refreshed;
                    Ok(())
                }
                None => Err(PluginMarketError::MarketplaceNotFound {
                    name: name.to_string(),
                }),
            }
        })?;

        info!(marketplace = %name, plugins = manifest.plugins.len(), "refreshed marketplace");
        Ok(manifest)
    }

    /// Manifest from the cached copy; a missing cache surfaces as a load error
    pub fn get_marketplace_manifest(&self, name: &str) -> Result<MarketplaceManifest> {
        let entry = self.registry_entry(name)?;
        load_marketplace_manifest(&entry.install_location)
    }

    // ========== Install state machine ==========

    pub fn install(&self, plugin: &str, marketplace: &str, scope: Scope) -> Result<()> {
        let key = PluginKey::new(plugin, marketplace).to_string();

        if let Some(blocked) = self.blocklist.load_blocklist()?.find(&key) {
            return Err(PluginMarketError::PluginBlocked {
                key,
                reason: blocked.reason.clone(),
            });
        }

        // Names come from remote manifests and end up as cache path components
        validate_name(plugin)?;
        validate_name(marketplace)?;

        let entry = self.registry_entry(marketplace)?;
        let manifest = load_marketplace_manifest(&entry.install_location)
            .map_err(|e| manifest_invalid(marketplace, e))?;
        let plugin_entry =
            manifest
                .plugin(plugin)
                .ok_or_else(|| PluginMarketError::PluginNotFound {
                    plugin: plugin.to_string(),
                    marketplace: marketplace.to_string(),
                })?;

        let ledger = self.ledger(scope)?;
        if ledger.load_enabled_plugins()?.contains_key(&key) {
            return Err(PluginMarketError::AlreadyInstalled { key, scope });
        }

        if let PluginSource::External(external) = &plugin_entry.source {
            let source = external.to_fetch_source()?;

            debug!(%key, %source, "fetching external plugin");
            let fetched = self.fetcher.fetch(&source)?;
            let path = self.cache.store_plugin(marketplace, plugin, fetched.path())?;
            debug!(%key, path = %path.display(), "cached plugin");
        }

        update_ledger(ledger, |plugins| {
            if plugins.contains_key(&key) {
                return Err(PluginMarketError::AlreadyInstalled {
                    key: key.clone(),
                    scope,
                });
            }
            plugins.insert(key.clone(), true);
            Ok(())
        })?;

        info!(%key, %scope, "installed plugin");
        Ok(())
    }

    pub fn uninstall(&self, plugin: &str, marketplace: &str, scope: Scope) -> Result<()> {
        let key = PluginKey::new(plugin, marketplace).to_string();
        let ledger = self.ledger(scope)?;

        update_ledger(ledger, |plugins| {
            plugins
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| PluginMarketError::NotInstalled { key: key.clone() })
        })?;
        info!(%key, %scope, "uninstalled plugin");

        // A hand-edited key with an unsafe name never had a cache entry
        if validate_name(plugin).is_err() || validate_name(marketplace).is_err() {
            warn!(%key, "skipping cache cleanup for unsafe plugin name");
            return Ok(());
        }

        if !self.is_installed(plugin, marketplace)? && self.cache.delete_plugin(marketplace, plugin)? {
            info!(%key, "deleted plugin cache");
        }

        Ok(())
    }

    pub fn enable(&self, plugin: &str, marketplace: &str, scope: Scope) -> Result<bool> {
        self.set_enabled(plugin, marketplace, scope, true)
    }

    pub fn disable(&self, plugin: &str, marketplace: &str, scope: Scope) -> Result<bool> {
        self.set_enabled(plugin, marketplace, scope, false)
    }

    /// Returns whether the flag changed
    fn set_enabled(
        &self,
        plugin: &str,
        marketplace: &str,
        scope: Scope,
        enabled: bool,
    ) -> Result<bool> {
        let key = PluginKey::new(plugin, marketplace).to_string();
        let ledger = self.ledger(scope)?;

        let changed = update_ledger(ledger, |plugins| match plugins.get_mut(&key) {
            Some(flag) => Ok(std::mem::replace(flag, enabled) != enabled),
            None => Err(PluginMarketError::NotInstalled { key: key.clone() }),
        })?;

        if changed {
            info!(%key, %scope, enabled, "updated plugin state");
        }
        Ok(changed)
    }

    // ========== Queries ==========

    pub fn list_installed(&self, filter: ScopeFilter) -> Result<Vec<InstalledPlugin>> {
        let scopes = match filter {
            ScopeFilter::All => self.configured_scopes(),
            ScopeFilter::Only(scope) => {
                self.ledger(scope)?;
                vec![scope]
            }
        };

        let mut installed = Vec::new();
        for scope in scopes {
            for (key, enabled) in self.ledger(scope)?.load_enabled_plugins()? {
                let Some(parsed) = PluginKey::parse(&key) else {
                    debug!(%key, %scope, "skipping malformed ledger key");
                    continue;
                };
                installed.push(InstalledPlugin {
                    name: parsed.plugin,
                    marketplace: parsed.marketplace,
                    enabled,
                    scope,
                });
            }
        }

        Ok(installed)
    }

    /// Installed (enabled or not) in any configured scope
    pub fn is_installed(&self, plugin: &str, marketplace: &str) -> Result<bool> {
        let key = PluginKey::new(plugin, marketplace).to_string();
        for ledger in self.settings.values() {
            if ledger.load_enabled_plugins()?.contains_key(&key) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Enabled in any configured scope
    pub fn is_enabled(&self, plugin: &str, marketplace: &str) -> Result<bool> {
        let key = PluginKey::new(plugin, marketplace).to_string();
        for ledger in self.settings.values() {
            if ledger.load_enabled_plugins()?.get(&key).copied().unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn is_blocked(&self, plugin: &str, marketplace: &str) -> Result<bool> {
        let key = PluginKey::new(plugin, marketplace).to_string();
        Ok(self.blocklist.load_blocklist()?.find(&key).is_some())
    }

    pub fn blocklist(&self) -> Result<BlocklistFile> {
        self.blocklist.load_blocklist()
    }

    /// Plugin cache location, whether or not it exists
    pub fn plugin_cache_path(&self, marketplace: &str, plugin: &str) -> Result<PathBuf> {
        self.cache.plugin_path(marketplace, plugin)
    }

    /// On-disk directory of a plugin, if any candidate location exists
    pub fn plugin_dir(&self, plugin: &str, marketplace: &str) -> Result<Option<PathBuf>> {
        let entry = self.registry_entry(marketplace)?;
        let manifest = load_marketplace_manifest(&entry.install_location)?;
        let plugin_entry =
            manifest
                .plugin(plugin)
                .ok_or_else(|| PluginMarketError::PluginNotFound {
                    plugin: plugin.to_string(),
                    marketplace: marketplace.to_string(),
                })?;

        let candidates = locate::candidates(&manifest, plugin_entry);
        Ok(locate::resolve(
            &candidates,
            plugin,
            &entry.install_location,
            &self.cache.plugin_path(marketplace, plugin)?,
        ))
    }

    /// One catalog entry with its installations
    pub fn get_plugin(&self, plugin: &str, marketplace: &str) -> Result<ResolvedPlugin> {
        let manifest = self.get_marketplace_manifest(marketplace)?;
        let mut resolved = manifest::get_plugin(&manifest, marketplace, plugin).ok_or_else(|| {
            PluginMarketError::PluginNotFound {
                plugin: plugin.to_string(),
                marketplace: marketplace.to_string(),
            }
        })?;
        self.attach_installations(std::slice::from_mut(&mut resolved))?;
        Ok(resolved)
    }

    pub fn list_marketplace_plugins(&self, marketplace: &str) -> Result<Vec<ResolvedPlugin>> {
        let manifest = self.get_marketplace_manifest(marketplace)?;
        let mut plugins = manifest::list_plugins(&manifest, marketplace);
        self.attach_installations(&mut plugins)?;
        Ok(plugins)
    }

    /// Search every registered marketplace whose cache loads
    pub fn search_plugins(&self, query: &str) -> Result<Vec<ResolvedPlugin>> {
        let mut results = Vec::new();

        for name in self.registry.load_marketplaces()?.keys() {
            match self.get_marketplace_manifest(name) {
                Ok(manifest) => results.extend(manifest::search_plugins(&manifest, name, query)),
                Err(e) => warn!(marketplace = %name, error = %e, "skipping marketplace"),
            }
        }

        self.attach_installations(&mut results)?;
        Ok(results)
    }

    fn attach_installations(&self, plugins: &mut [ResolvedPlugin]) -> Result<()> {
        let mut by_key: BTreeMap<String, Vec<(Scope, bool)>> = BTreeMap::new();
        for (scope, ledger) in &self.settings {
            for (key, enabled) in ledger.load_enabled_plugins()? {
                by_key.entry(key).or_default().push((*scope, enabled));
            }
        }

        for plugin in plugins.iter_mut() {
            plugin.installations = by_key.get(&plugin.key).cloned().unwrap_or_default();
        }
        Ok(())
    }

    // ========== Updates ==========

    pub fn check_update(&self, plugin: &str, marketplace: &str) -> Result<UpdateCheckResult> {
        let manifest = self.get_marketplace_manifest(marketplace)?;
        let Some(latest) = manifest.plugin(plugin).map(|p| p.version.clone()) else {
            debug!(plugin, marketplace, "plugin not listed, no version to compare");
            return Ok(UpdateCheckResult::new(plugin, marketplace, None, None));
        };

        let current = if self.is_installed(plugin, marketplace)? {
            match self.plugin_dir(plugin, marketplace)? {
                Some(dir) => load_optional_plugin_manifest(&dir)?.and_then(|m| m.version),
                None => None,
            }
        } else {
            None
        };

        Ok(UpdateCheckResult::new(plugin, marketplace, current, latest))
    }

    /// One result per enabled (plugin, marketplace) pair across all scopes.
    ///
    /// A pair whose check fails is reported with both versions unknown.
    pub fn check_all_updates(&self) -> Result<Vec<UpdateCheckResult>> {
        let pairs: BTreeSet<PluginKey> = self
            .list_installed(ScopeFilter::All)?
            .into_iter()
            .filter(|p| p.enabled)
            .map(|p| PluginKey::new(&p.name, &p.marketplace))
            .collect();

        Ok(pairs
            .into_iter()
            .map(|key| {
                self.check_update(&key.plugin, &key.marketplace)
                    .unwrap_or_else(|e| {
                        warn!(%key, error = %e, "update check failed");
                        UpdateCheckResult::new(&key.plugin, &key.marketplace, None, None)
                    })
            })
            .collect())
    }
}

/// A manifest that cannot be loaded from a fetched or cached marketplace tree
fn manifest_invalid(marketplace: &str, err: PluginMarketError) -> PluginMarketError {
    match err {
        PluginMarketError::Load { path, message } => PluginMarketError::ManifestInvalid {
            marketplace: marketplace.to_string(),
            path,
            message,
        },
        other => other,
    }
}
