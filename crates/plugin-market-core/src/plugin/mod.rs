//! Plugin Module
//!
//! Marketplace registry, settings ledgers, content cache, blocklist and the
//! fetch port, orchestrated by [`PluginManager`].
//!
//! - `types`: manifest, registry and ledger data types
//! - `registry` / `blocklist` / `cache` / `settings`: persistent stores
//! - `fetcher`: turns a source into a local directory
//! - `manifest` / `validation`: marketplace.json and plugin.json handling
//! - `locate`: on-disk plugin directory resolution
//! - `manager`: install/uninstall/enable/disable and queries

pub mod blocklist;
pub mod cache;
pub mod fetcher;
pub mod locate;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod settings;
pub mod store;
pub mod types;
pub mod validation;

// Re-exports
pub use blocklist::BlocklistSource;
pub use cache::{ContentCache, DirCache};
pub use fetcher::{DefaultFetcher, FetchedDir, Fetcher};
pub use locate::PathCandidate;
pub use manager::PluginManager;
pub use manifest::{
    load_marketplace_manifest, load_optional_plugin_manifest, load_plugin_manifest,
    parse_marketplace_str, MARKETPLACE_FILE, PLUGIN_FILE,
};
pub use registry::{update_registry, PluginRegistry, RegistryStore};
pub use settings::{update_ledger, SettingsFile, SettingsLedger};
pub use types::{
    validate_name, BlockedPlugin, BlocklistFile, EnabledPlugins, ExternalSource, InstalledPlugin,
    KnownMarketplaces, MarketplaceManifest, MarketplaceMetadata, MarketplaceOwner,
    MarketplaceSource, PluginAuthor, PluginEntry, PluginKey, PluginManifest, PluginSource,
    RegistryEntry, ResolvedPlugin, Scope, ScopeFilter, UpdateCheckResult,
};
pub use validation::{
    validate_marketplace, validate_marketplace_file, validate_plugin, validate_plugin_file,
    ValidationIssue, ValidationLevel, ValidationResult, RESERVED_MARKETPLACE_NAMES,
};
