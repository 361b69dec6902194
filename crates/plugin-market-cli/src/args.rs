use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plugin-market")]
#[command(about = "Marketplace-based plugin manager for AI agents")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Base directory (default: ~/.plugin-market)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Project root; enables the project and local scopes
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    User,
    Project,
    Local,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeFilterArg {
    All,
    User,
    Project,
    Local,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage registered marketplaces
    Marketplace {
        #[command(subcommand)]
        action: MarketplaceAction,
    },

    /// Install a plugin (plugin@marketplace)
    Install {
        plugin: String,

        #[arg(short, long, value_enum, default_value = "user")]
        scope: ScopeArg,
    },

    /// Uninstall a plugin (plugin@marketplace)
    Uninstall {
        plugin: String,

        #[arg(short, long, value_enum, default_value = "user")]
        scope: ScopeArg,
    },

    /// Enable an installed plugin
    Enable {
        plugin: String,

        #[arg(short, long, value_enum, default_value = "user")]
        scope: ScopeArg,
    },

    /// Disable an installed plugin
    Disable {
        plugin: String,

        #[arg(short, long, value_enum, default_value = "user")]
        scope: ScopeArg,
    },

    /// List installed plugins
    List {
        #[arg(short, long, value_enum, default_value = "all")]
        scope: ScopeFilterArg,
    },

    /// Show enabled plugins with a newer version in their marketplace
    Outdated,

    /// Compare installed and published version of one plugin
    Check {
        plugin: String,
    },

    /// Search plugins across registered marketplaces
    Search {
        /// Matched against name, description, category, tags and keywords
        query: String,
    },

    /// Validate a marketplace.json or plugin.json (file or directory)
    Validate {
        path: PathBuf,
    },

    /// Show blocked plugins
    Blocklist,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum MarketplaceAction {
    /// Add a marketplace
    ///
    /// Source formats:
    ///   owner/repo            GitHub repository
    ///   https://host/x.git    git repository
    ///   https://host/m.json   marketplace.json over HTTP
    ///   ./path or /path       local directory
    Add {
        source: String,

        /// Register under this name instead of the manifest's
        #[arg(long)]
        name: Option<String>,

        /// Branch or tag (git sources only)
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },

    /// List registered marketplaces
    List,

    /// Remove a marketplace and its cached tree
    Remove {
        name: String,
    },

    /// Re-fetch a marketplace from its registered source
    Refresh {
        name: String,
    },

    /// Show the plugins of a marketplace
    Show {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., fetch.git_timeout_secs)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., paths.plugins_dir)
        key: String,

        /// Value to set (empty string resets a path to its default)
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Initialize config file with defaults
    Init,
}
