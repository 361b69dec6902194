//! Plugin marketplace type definitions
//!
//! Manifest types (marketplace.json / plugin.json), persisted state types
//! (known_marketplaces.json, blocklist.json, settings ledgers) and the
//! result records returned by the manager.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PluginMarketError, Result};

/// "owner/repo" GitHub shorthand
static GITHUB_SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.-]+/[\w.-]+$").expect("valid shorthand regex"));

// ========== Manifests ==========

/// Marketplace manifest (parsed from .claude-plugin/marketplace.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceManifest {
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Marketplace name (unique identifier)
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner information
    pub owner: MarketplaceOwner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MarketplaceMetadata>,
    /// Available plugins
    pub plugins: Vec<PluginEntry>,
}

impl MarketplaceManifest {
    /// Find a plugin entry by name
    pub fn plugin(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Base directory for relative plugin paths, if declared
    pub fn plugin_root(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.plugin_root.as_deref())
    }
}

/// Marketplace owner information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceOwner {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Optional marketplace metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketplaceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Base directory for relative plugin paths
    #[serde(
        default,
        rename = "pluginRoot",
        skip_serializing_if = "Option::is_none"
    )]
    pub plugin_root: Option<String>,
}

/// Plugin entry in marketplace.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Plugin name (unique identifier within marketplace)
    pub name: String,
    /// Source location
    pub source: PluginSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<PluginAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether plugin needs its own plugin.json (default: true)
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

/// Plugin source: a path inside the marketplace tree, or its own external source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginSource {
    /// Relative path (e.g., "./plugins/my-plugin")
    Relative(String),
    /// Typed external source
    External(ExternalSource),
}

impl PluginSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Relative(_) => "relative",
            Self::External(source) => source.kind(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

/// Typed plugin source, discriminated by its `source` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ExternalSource {
    Github {
        repo: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha: Option<String>,
    },
    #[serde(alias = "git")]
    Url {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha: Option<String>,
    },
    Npm {
        package: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
    Pip {
        package: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
    },
    Http {
        url: String,
    },
}

impl ExternalSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Github { .. } => "github",
            Self::Url { .. } => "url",
            Self::Npm { .. } => "npm",
            Self::Pip { .. } => "pip",
            Self::Http { .. } => "http",
        }
    }

    /// Convert to a source the fetch port understands.
    ///
    /// npm and pip sources are declarable but cannot be fetched yet.
    pub fn to_fetch_source(&self) -> Result<MarketplaceSource> {
        match self {
            Self::Github { repo, r#ref, sha } => Ok(MarketplaceSource::Github {
                repo: repo.clone(),
                r#ref: r#ref.clone(),
                sha: sha.clone(),
            }),
            Self::Url { url, r#ref, sha } => Ok(MarketplaceSource::Git {
                url: url.clone(),
                r#ref: r#ref.clone(),
                sha: sha.clone(),
            }),
            Self::Http { url } => Ok(MarketplaceSource::Http { url: url.clone() }),
            Self::Npm { package, .. } | Self::Pip { package, .. } => {
                Err(PluginMarketError::fetch(
                    package.clone(),
                    format!("{} source is not implemented", self.kind()),
                ))
            }
        }
    }
}

/// Plugin author information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Plugin manifest (plugin.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<PluginAuthor>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

// ========== Marketplace registry ==========

/// Where a marketplace (or an externally sourced plugin) is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum MarketplaceSource {
    Github {
        repo: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha: Option<String>,
    },
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        r#ref: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha: Option<String>,
    },
    Http {
        url: String,
    },
    Directory {
        path: PathBuf,
    },
    /// Declarable but never fetchable
    HostPattern {
        #[serde(rename = "hostPattern")]
        host_pattern: String,
    },
}

impl MarketplaceSource {
    /// Detect a source from a free-form string.
    ///
    /// - starts with `.` or `/` -> local directory
    /// - ends with `.git` -> git URL
    /// - `owner/repo` -> GitHub
    /// - anything else -> HTTP URL to a marketplace.json
    pub fn detect(input: &str) -> Self {
        if input.starts_with('.') || input.starts_with('/') {
            Self::Directory {
                path: PathBuf::from(input),
            }
        } else if input.ends_with(".git") {
            Self::Git {
                url: input.to_string(),
                r#ref: None,
                sha: None,
            }
        } else if GITHUB_SHORTHAND.is_match(input) {
            Self::Github {
                repo: input.to_string(),
                r#ref: None,
                sha: None,
            }
        } else {
            Self::Http {
                url: input.to_string(),
            }
        }
    }

    /// Replace the git ref; no-op for sources without one
    pub fn with_ref(self, git_ref: Option<&str>) -> Self {
        let Some(git_ref) = git_ref else {
            return self;
        };
        match self {
            Self::Github { repo, sha, .. } => Self::Github {
                repo,
                r#ref: Some(git_ref.to_string()),
                sha,
            },
            Self::Git { url, sha, .. } => Self::Git {
                url,
                r#ref: Some(git_ref.to_string()),
                sha,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Github { .. } => "github",
            Self::Git { .. } => "git",
            Self::Http { .. } => "http",
            Self::Directory { .. } => "directory",
            Self::HostPattern { .. } => "hostPattern",
        }
    }

    /// Identifier attached to fetch errors
    pub fn source_id(&self) -> String {
        match self {
            Self::Github { repo, .. } => repo.clone(),
            Self::Git { url, .. } | Self::Http { url } => url.clone(),
            Self::Directory { path } => path.display().to_string(),
            Self::HostPattern { host_pattern } => host_pattern.clone(),
        }
    }
}

impl fmt::Display for MarketplaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.source_id())
    }
}

/// Entry in known_marketplaces.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub source: MarketplaceSource,
    /// Local cache path of the marketplace tree
    #[serde(rename = "installLocation")]
    pub install_location: PathBuf,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

/// known_marketplaces.json structure: name -> entry
pub type KnownMarketplaces = BTreeMap<String, RegistryEntry>;

// ========== Blocklist ==========

/// blocklist.json structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistFile {
    #[serde(rename = "fetchedAt")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub plugins: Vec<BlockedPlugin>,
}

impl Default for BlocklistFile {
    fn default() -> Self {
        Self {
            fetched_at: DateTime::<Utc>::default(),
            plugins: Vec::new(),
        }
    }
}

impl BlocklistFile {
    /// Find the entry blocking `key` ("plugin@marketplace")
    pub fn find(&self, key: &str) -> Option<&BlockedPlugin> {
        self.plugins.iter().find(|p| p.plugin == key)
    }
}

/// Single blocked plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedPlugin {
    /// "plugin@marketplace"
    pub plugin: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ========== Scopes and ledger ==========

/// Configuration scope owning one settings ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// User scope (~/.claude/settings.json)
    User,
    /// Project scope (.claude/settings.json)
    Project,
    /// Local scope (.claude/settings.local.json)
    Local,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::User, Scope::Project, Scope::Local];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Project => write!(f, "project"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "project" => Ok(Self::Project),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown scope: {}", other)),
        }
    }
}

/// Which scopes a listing covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    #[default]
    All,
    Only(Scope),
}

impl From<Scope> for ScopeFilter {
    fn from(scope: Scope) -> Self {
        Self::Only(scope)
    }
}

/// A scope's ledger: "plugin@marketplace" -> enabled
pub type EnabledPlugins = BTreeMap<String, bool>;

/// Identity of an installation: "plugin@marketplace"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginKey {
    pub plugin: String,
    pub marketplace: String,
}

impl PluginKey {
    pub fn new(plugin: &str, marketplace: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            marketplace: marketplace.to_string(),
        }
    }

    /// Split on the last `@`; `None` for keys without one
    pub fn parse(key: &str) -> Option<Self> {
        let (plugin, marketplace) = key.rsplit_once('@')?;
        if plugin.is_empty() || marketplace.is_empty() {
            return None;
        }
        Some(Self::new(plugin, marketplace))
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.plugin, self.marketplace)
    }
}

/// Reject names that cannot be used as a single path component or key part
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('@');

    if invalid {
        return Err(PluginMarketError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

// ========== Query results ==========

/// Flattened ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    pub name: String,
    pub marketplace: String,
    pub enabled: bool,
    pub scope: Scope,
}

impl InstalledPlugin {
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.marketplace)
    }
}

/// Outcome of comparing installed and published versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheckResult {
    pub plugin: String,
    pub marketplace: String,
    pub current_version: Option<String>,
    pub latest_version: Option<String>,
    pub has_update: bool,
}

impl UpdateCheckResult {
    /// Raw string inequality; unknown on either side is never an update
    pub fn new(
        plugin: &str,
        marketplace: &str,
        current_version: Option<String>,
        latest_version: Option<String>,
    ) -> Self {
        let has_update = match (&current_version, &latest_version) {
            (Some(current), Some(latest)) => current != latest,
            _ => false,
        };
        Self {
            plugin: plugin.to_string(),
            marketplace: marketplace.to_string(),
            current_version,
            latest_version,
            has_update,
        }
    }
}

/// Plugin with full resolved information
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub name: String,
    pub marketplace: String,
    /// Full identifier (name@marketplace)
    pub key: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// "relative", "github", "url", "npm", "pip" or "http"
    pub source_kind: &'static str,
    /// Scopes holding this plugin, with their enabled flag
    pub installations: Vec<(Scope, bool)>,
}

impl ResolvedPlugin {
    /// Create from plugin entry and marketplace name
    pub fn from_entry(entry: &PluginEntry, marketplace: &str) -> Self {
        Self {
            name: entry.name.clone(),
            marketplace: marketplace.to_string(),
            key: format!("{}@{}", entry.name, marketplace),
            version: entry.version.clone(),
            description: entry.description.clone(),
            category: entry.category.clone(),
            tags: entry.tags.clone(),
            source_kind: entry.source.kind(),
            installations: Vec::new(),
        }
    }

    pub fn is_installed(&self) -> bool {
        !self.installations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_marketplace_json() {
        let json = r#"{
            "name": "test-marketplace",
            "owner": { "name": "Test Owner" },
            "plugins": [
                {
                    "name": "test-plugin",
                    "source": "./plugins/test-plugin",
                    "description": "A test plugin"
                }
            ]
        }"#;

        let manifest: MarketplaceManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.name, "test-marketplace");
        assert_eq!(manifest.owner.name, "Test Owner");
        assert_eq!(manifest.plugins.len(), 1);
        assert!(manifest.plugins[0].strict);
        assert!(manifest.plugin("test-plugin").is_some());
    }

    #[test]
    fn test_manifest_requires_plugins() {
        let json = r#"{"name": "m", "owner": {"name": "o"}}"#;
        assert!(serde_json::from_str::<MarketplaceManifest>(json).is_err());
    }

    #[test]
    fn test_parse_plugin_source_relative() {
        let source: PluginSource = serde_json::from_str(r#""./plugins/my-plugin""#).unwrap();
        assert_eq!(source, PluginSource::Relative("./plugins/my-plugin".to_string()));
        assert!(!source.is_external());
    }

    #[test]
    fn test_parse_plugin_source_typed() {
        let source: PluginSource =
            serde_json::from_str(r#"{"source": "github", "repo": "user/repo", "ref": "v1"}"#)
                .unwrap();
        assert_eq!(
            source,
            PluginSource::External(ExternalSource::Github {
                repo: "user/repo".to_string(),
                r#ref: Some("v1".to_string()),
                sha: None,
            })
        );

        let source: PluginSource =
            serde_json::from_str(r#"{"source": "git", "url": "https://x/y.git"}"#).unwrap();
        assert_eq!(source.kind(), "url");

        let source: PluginSource =
            serde_json::from_str(r#"{"source": "npm", "package": "@acme/plugin"}"#).unwrap();
        assert_eq!(source.kind(), "npm");
    }

    #[test]
    fn test_npm_and_pip_are_not_fetchable() {
        let npm = ExternalSource::Npm {
            package: "pkg".to_string(),
            version: None,
            registry: None,
        };
        let err = npm.to_fetch_source().unwrap_err();
        assert!(err.to_string().contains("npm source is not implemented"));

        let pip = ExternalSource::Pip {
            package: "pkg".to_string(),
            version: None,
            registry: None,
        };
        let err = pip.to_fetch_source().unwrap_err();
        assert!(err.to_string().contains("pip source is not implemented"));
    }

    #[test]
    fn test_detect_source() {
        assert_eq!(
            MarketplaceSource::detect("owner/repo"),
            MarketplaceSource::Github {
                repo: "owner/repo".to_string(),
                r#ref: None,
                sha: None
            }
        );
        assert_eq!(MarketplaceSource::detect("https://host/x.git").kind(), "git");
        assert_eq!(MarketplaceSource::detect("owner/repo.git").kind(), "git");
        assert_eq!(
            MarketplaceSource::detect("https://host/marketplace.json").kind(),
            "http"
        );
        assert_eq!(MarketplaceSource::detect("./local").kind(), "directory");
        assert_eq!(MarketplaceSource::detect("/abs/path").kind(), "directory");
    }

    #[test]
    fn test_with_ref_only_applies_to_git_sources() {
        let source = MarketplaceSource::detect("owner/repo").with_ref(Some("main"));
        assert!(matches!(source, MarketplaceSource::Github { r#ref: Some(ref r), .. } if r == "main"));

        let http = MarketplaceSource::detect("https://host/m.json").with_ref(Some("main"));
        assert_eq!(
            http,
            MarketplaceSource::Http {
                url: "https://host/m.json".to_string()
            }
        );
    }

    #[test]
    fn test_registry_entry_json() {
        let json = r#"{
            "source": { "source": "hostPattern", "hostPattern": "*.corp.example" },
            "installLocation": "/path/to/marketplace",
            "lastUpdated": "2025-01-01T00:00:00Z"
        }"#;

        let entry: RegistryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.source.kind(), "hostPattern");

        let out = serde_json::to_value(&entry).unwrap();
        assert_eq!(out["source"]["hostPattern"], "*.corp.example");
        assert_eq!(out["installLocation"], "/path/to/marketplace");
    }

    #[test]
    fn test_blocklist_json() {
        let json = r#"{
            "fetchedAt": "2025-01-01T00:00:00Z",
            "plugins": [
                { "plugin": "bad@market", "added_at": "2025-01-01T00:00:00Z", "reason": "security" }
            ]
        }"#;

        let blocklist: BlocklistFile = serde_json::from_str(json).unwrap();
        let entry = blocklist.find("bad@market").unwrap();
        assert_eq!(entry.reason.as_deref(), Some("security"));
        assert!(blocklist.find("good@market").is_none());
    }

    #[test]
    fn test_plugin_key() {
        let key = PluginKey::parse("my-plugin@my-market").unwrap();
        assert_eq!(key.plugin, "my-plugin");
        assert_eq!(key.marketplace, "my-market");
        assert_eq!(key.to_string(), "my-plugin@my-market");

        assert!(PluginKey::parse("no-separator").is_none());
        assert!(PluginKey::parse("@market").is_none());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("good-name_1.0").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a@b").is_err());
    }

    #[test]
    fn test_update_check_result() {
        let same = UpdateCheckResult::new("p", "m", Some("1.0".into()), Some("1.0".into()));
        assert!(!same.has_update);

        let newer = UpdateCheckResult::new("p", "m", Some("1.0".into()), Some("0.9".into()));
        assert!(newer.has_update);

        let unknown = UpdateCheckResult::new("p", "m", None, Some("1.0".into()));
        assert!(!unknown.has_update);
    }

    #[test]
    fn test_resolved_plugin() {
        let entry = PluginEntry {
            name: "test-plugin".to_string(),
            source: PluginSource::Relative("./plugins/test".to_string()),
            description: Some("Test".to_string()),
            version: Some("1.0.0".to_string()),
            author: None,
            homepage: None,
            repository: None,
            license: None,
            keywords: Vec::new(),
            category: Some("dev".to_string()),
            tags: vec!["rust".to_string()],
            strict: true,
        };

        let resolved = ResolvedPlugin::from_entry(&entry, "my-marketplace");
        assert_eq!(resolved.key, "test-plugin@my-marketplace");
        assert_eq!(resolved.source_kind, "relative");
        assert!(!resolved.is_installed());
    }
}
