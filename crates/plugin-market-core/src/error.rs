use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::types::Scope;

#[derive(Debug, Error)]
pub enum PluginMarketError {
    #[error("Marketplace not found: {name}")]
    MarketplaceNotFound { name: String },

    #[error("Plugin '{plugin}' not found in marketplace '{marketplace}'")]
    PluginNotFound { plugin: String, marketplace: String },

    #[error("Plugin is not installed: {key}")]
    NotInstalled { key: String },

    #[error("Plugin is already installed in {scope} scope: {key}")]
    AlreadyInstalled { key: String, scope: Scope },

    #[error("Plugin is blocked: {key}{}", .reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default())]
    PluginBlocked { key: String, reason: Option<String> },

    #[error("Invalid manifest for marketplace '{marketplace}' at {path}: {message}")]
    ManifestInvalid {
        marketplace: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Fetch failed for {source_id}: {message}")]
    Fetch { source_id: String, message: String },

    #[error("Scope '{scope}' is not configured on this manager")]
    ScopeNotConfigured { scope: Scope },

    #[error("Invalid name: '{name}' - must be non-empty and must not contain path separators or '..'")]
    InvalidName { name: String },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Config key not found: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, PluginMarketError>;

impl PluginMarketError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn fetch(source_id: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }

    /// Errors caused by how the manager was wired, not by the state it manages.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::ScopeNotConfigured { .. } | Self::ConfigKeyNotFound { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MarketplaceNotFound { .. } => 2,
            Self::PluginNotFound { .. } => 3,
            Self::NotInstalled { .. } => 4,
            Self::AlreadyInstalled { .. } => 5,
            Self::PluginBlocked { .. } => 6,
            Self::ManifestInvalid { .. } | Self::Load { .. } => 7,
            Self::Fetch { .. } => 8,
            e if e.is_usage_error() => 64,
            _ => 1,
        }
    }
}
