pub mod config;
pub mod error;
pub mod plugin;

pub use config::{Config, FetchConfig, PathsConfig};
pub use error::{PluginMarketError, Result};
pub use plugin::{
    BlocklistFile, DefaultFetcher, FetchedDir, Fetcher, InstalledPlugin, KnownMarketplaces,
    MarketplaceManifest, MarketplaceSource, PluginKey, PluginManager, RegistryEntry,
    ResolvedPlugin, Scope, ScopeFilter, UpdateCheckResult, ValidationResult,
};
