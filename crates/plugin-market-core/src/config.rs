use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PluginMarketError, Result};

const CONFIG_FILE: &str = "config.toml";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# plugin-market configuration file
# Location: ~/.plugin-market/config.toml

[paths]
# Root of known_marketplaces.json, blocklist.json and the content caches
# Default: ~/.claude/plugins
# plugins_dir = "/home/me/.claude/plugins"

# Settings file holding the user-scope plugin ledger
# Default: ~/.claude/settings.json
# user_settings = "/home/me/.claude/settings.json"

[fetch]
# Seconds before a git clone is killed
git_timeout_secs = 120

# Seconds before an HTTP request is abandoned
http_timeout_secs = 30
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Filesystem locations; unset means the Claude defaults under $HOME
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_settings: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_git_timeout() -> u64 {
    120
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            git_timeout_secs: default_git_timeout(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl FetchConfig {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| PluginMarketError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;

        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Resolved plugins directory
    pub fn plugins_dir(&self) -> Result<PathBuf> {
        match &self.paths.plugins_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(claude_home()?.join("plugins")),
        }
    }

    /// Resolved user settings file
    pub fn user_settings(&self) -> Result<PathBuf> {
        match &self.paths.user_settings {
            Some(path) => Ok(path.clone()),
            None => Ok(claude_home()?.join("settings.json")),
        }
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "paths.plugins_dir" => Some(display_path(&self.paths.plugins_dir)),
            "paths.user_settings" => Some(display_path(&self.paths.user_settings)),
            "fetch.git_timeout_secs" => Some(self.fetch.git_timeout_secs.to_string()),
            "fetch.http_timeout_secs" => Some(self.fetch.http_timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "paths.plugins_dir" => {
                self.paths.plugins_dir = parse_optional_path(value);
                Ok(())
            }
            "paths.user_settings" => {
                self.paths.user_settings = parse_optional_path(value);
                Ok(())
            }
            "fetch.git_timeout_secs" => {
                self.fetch.git_timeout_secs = parse_secs(key, value)?;
                Ok(())
            }
            "fetch.http_timeout_secs" => {
                self.fetch.http_timeout_secs = parse_secs(key, value)?;
                Ok(())
            }
            _ => Err(PluginMarketError::ConfigKeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "paths.plugins_dir",
            "paths.user_settings",
            "fetch.git_timeout_secs",
            "fetch.http_timeout_secs",
        ]
        .iter()
        .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
        .collect()
    }
}

fn claude_home() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(PluginMarketError::HomeNotFound)?;
    Ok(home.join(".claude"))
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default)".to_string())
}

/// Empty string resets to the default location
fn parse_optional_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| PluginMarketError::ConfigParse {
            path: PathBuf::from(key),
            message: format!("expected a positive number of seconds, got '{}'", value),
        })
}
