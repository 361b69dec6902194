use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use plugin_market_core::config::Config;
use plugin_market_core::plugin::{
    validate_marketplace_file, validate_plugin_file, ValidationLevel, MARKETPLACE_FILE, PLUGIN_FILE,
};
use plugin_market_core::{
    PluginKey, PluginManager, PluginMarketError, ResolvedPlugin, Result, Scope, ScopeFilter,
};

mod args;
use args::{Cli, Commands, ConfigAction, MarketplaceAction, ScopeArg, ScopeFilterArg, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let base_dir = resolve_base_dir(cli.base_dir);
    let project = cli.project;
    tracing::debug!(base_dir = %base_dir.display(), project = ?project, "resolved directories");

    let result = match cli.command {
        Commands::Marketplace { action } => {
            with_manager(&base_dir, project.as_deref(), |m| handle_marketplace(m, action))
        }
        Commands::Install { plugin, scope } => {
            with_manager(&base_dir, project.as_deref(), |m| {
                let key = parse_key(&plugin)?;
                let scope: Scope = scope.into();
                m.install(&key.plugin, &key.marketplace, scope)?;
                println!("{} {} ({})", "Installed:".green(), key, scope);
                Ok(())
            })
        }
        Commands::Uninstall { plugin, scope } => {
            with_manager(&base_dir, project.as_deref(), |m| {
                let key = parse_key(&plugin)?;
                let scope: Scope = scope.into();
                m.uninstall(&key.plugin, &key.marketplace, scope)?;
                println!("{} {} ({})", "Uninstalled:".green(), key, scope);
                Ok(())
            })
        }
        Commands::Enable { plugin, scope } => {
            with_manager(&base_dir, project.as_deref(), |m| {
                handle_toggle(m, &plugin, scope.into(), true)
            })
        }
        Commands::Disable { plugin, scope } => {
            with_manager(&base_dir, project.as_deref(), |m| {
                handle_toggle(m, &plugin, scope.into(), false)
            })
        }
        Commands::List { scope } => {
            with_manager(&base_dir, project.as_deref(), |m| handle_list(m, scope.into()))
        }
        Commands::Outdated => with_manager(&base_dir, project.as_deref(), handle_outdated),
        Commands::Check { plugin } => {
            with_manager(&base_dir, project.as_deref(), |m| handle_check(m, &plugin))
        }
        Commands::Search { query } => {
            with_manager(&base_dir, project.as_deref(), |m| handle_search(m, &query))
        }
        Commands::Validate { path } => handle_validate(&path),
        Commands::Blocklist => with_manager(&base_dir, project.as_deref(), handle_blocklist),
        Commands::Config { action } => handle_config(action, &base_dir),
        Commands::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// RUST_LOG wins; otherwise warnings, or debug with --verbose
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        "plugin_market=debug,plugin_market_core=debug"
    } else if quiet {
        "plugin_market=error,plugin_market_core=error"
    } else {
        "plugin_market=warn,plugin_market_core=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "plugin-market", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("PLUGIN_MARKET_BASE") {
        return PathBuf::from(base);
    }

    dirs::home_dir()
        .map(|h| h.join(".plugin-market"))
        .unwrap_or_else(|| PathBuf::from(".plugin-market"))
}

fn with_manager(
    base_dir: &Path,
    project: Option<&Path>,
    run: impl FnOnce(&PluginManager) -> Result<()>,
) -> Result<()> {
    let config = Config::load(base_dir)?;
    let manager = PluginManager::from_config(&config, project)?;
    run(&manager)
}

fn parse_key(input: &str) -> Result<PluginKey> {
    PluginKey::parse(input).ok_or_else(|| PluginMarketError::InvalidName {
        name: input.to_string(),
    })
}

impl From<ScopeArg> for Scope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::User => Scope::User,
            ScopeArg::Project => Scope::Project,
            ScopeArg::Local => Scope::Local,
        }
    }
}

impl From<ScopeFilterArg> for ScopeFilter {
    fn from(scope: ScopeFilterArg) -> Self {
        match scope {
            ScopeFilterArg::All => ScopeFilter::All,
            ScopeFilterArg::User => ScopeFilter::Only(Scope::User),
            ScopeFilterArg::Project => ScopeFilter::Only(Scope::Project),
            ScopeFilterArg::Local => ScopeFilter::Only(Scope::Local),
        }
    }
}

fn handle_marketplace(manager: &PluginManager, action: MarketplaceAction) -> Result<()> {
    match action {
        MarketplaceAction::Add {
            source,
            name,
            git_ref,
        } => {
            let (name, manifest) =
                manager.add_marketplace(&source, name.as_deref(), git_ref.as_deref())?;
            println!(
                "{} {} ({} plugins)",
                "Added:".green(),
                name.cyan(),
                manifest.plugins.len()
            );
        }
        MarketplaceAction::List => {
            let marketplaces = manager.list_marketplaces()?;
            if marketplaces.is_empty() {
                println!("No marketplaces registered.");
                println!(
                    "  {}",
                    "plugin-market marketplace add <owner/repo>".dimmed()
                );
                return Ok(());
            }

            println!();
            for (name, entry) in &marketplaces {
                println!("  {} {}", name.cyan().bold(), entry.source.to_string().dimmed());
                println!(
                    "    updated {}",
                    entry.last_updated.format("%Y-%m-%d %H:%M UTC")
                );
            }
            println!();
        }
        MarketplaceAction::Remove { name } => {
            manager.remove_marketplace(&name)?;
            println!("{} {}", "Removed:".green(), name);
        }
        MarketplaceAction::Refresh { name } => {
            let manifest = manager.refresh_marketplace(&name)?;
            println!(
                "{} {} ({} plugins)",
                "Refreshed:".green(),
                name.cyan(),
                manifest.plugins.len()
            );
        }
        MarketplaceAction::Show { name } => {
            let plugins = manager.list_marketplace_plugins(&name)?;
            println!();
            println!("{}", name.cyan().bold());
            println!();
            print_plugins(&plugins);
        }
    }

    Ok(())
}

fn handle_toggle(manager: &PluginManager, plugin: &str, scope: Scope, enable: bool) -> Result<()> {
    let key = parse_key(plugin)?;
    let changed = if enable {
        manager.enable(&key.plugin, &key.marketplace, scope)?
    } else {
        manager.disable(&key.plugin, &key.marketplace, scope)?
    };

    let state = if enable { "enabled" } else { "disabled" };
    if changed {
        println!("{} {} {} ({})", "Updated:".green(), key, state, scope);
    } else {
        println!("{} already {} ({})", key, state, scope);
    }
    Ok(())
}

fn handle_list(manager: &PluginManager, filter: ScopeFilter) -> Result<()> {
    let installed = manager.list_installed(filter)?;
    if installed.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    println!();
    for plugin in installed {
        let state = if plugin.enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        };
        println!(
            "  {} [{}] {}",
            plugin.key().cyan(),
            plugin.scope.to_string().dimmed(),
            state
        );
    }
    println!();
    Ok(())
}

fn handle_outdated(manager: &PluginManager) -> Result<()> {
    let outdated: Vec<_> = manager
        .check_all_updates()?
        .into_iter()
        .filter(|r| r.has_update)
        .collect();

    if outdated.is_empty() {
        println!("All enabled plugins are up to date.");
        return Ok(());
    }

    println!();
    for result in outdated {
        println!(
            "  {}@{} {} -> {}",
            result.plugin.cyan(),
            result.marketplace,
            result.current_version.as_deref().unwrap_or("?").yellow(),
            result.latest_version.as_deref().unwrap_or("?").green()
        );
    }
    println!();
    Ok(())
}

fn handle_check(manager: &PluginManager, plugin: &str) -> Result<()> {
    let key = parse_key(plugin)?;
    let info = manager.get_plugin(&key.plugin, &key.marketplace)?;
    let result = manager.check_update(&key.plugin, &key.marketplace)?;

    if let Some(desc) = &info.description {
        println!("{}", desc.dimmed());
    }
    println!(
        "{} installed {} / published {}",
        key.to_string().cyan(),
        result.current_version.as_deref().unwrap_or("unknown"),
        result.latest_version.as_deref().unwrap_or("unknown")
    );
    if result.has_update {
        println!("{}", "Update available".yellow().bold());
    }
    Ok(())
}

fn handle_search(manager: &PluginManager, query: &str) -> Result<()> {
    let results = manager.search_plugins(query)?;
    if results.is_empty() {
        println!("No results found for: {}", query);
        return Ok(());
    }

    println!();
    println!("{}", "Search Results:".cyan().bold());
    println!();
    print_plugins(&results);
    Ok(())
}

fn print_plugins(plugins: &[ResolvedPlugin]) {
    for plugin in plugins {
        let installed = if plugin.is_installed() {
            let scopes: Vec<_> = plugin
                .installations
                .iter()
                .map(|(scope, enabled)| {
                    if *enabled {
                        scope.to_string()
                    } else {
                        format!("{} (disabled)", scope)
                    }
                })
                .collect();
            format!(" [installed: {}]", scopes.join(", ")).green().to_string()
        } else {
            String::new()
        };

        println!(
            "  {} {} {}{}",
            plugin.key.cyan(),
            plugin.version.as_deref().unwrap_or("-").dimmed(),
            plugin.source_kind.dimmed(),
            installed
        );
        if let Some(desc) = &plugin.description {
            println!("    {}", desc);
        }
    }
    println!();
}

fn handle_validate(path: &Path) -> Result<()> {
    // A directory holding only plugin.json, or a plugin.json itself, is a plugin
    let (file, is_plugin) = if path.is_dir() {
        let marketplace = path.join(MARKETPLACE_FILE);
        let plugin = path.join(PLUGIN_FILE);
        if !marketplace.exists() && plugin.exists() {
            (plugin, true)
        } else {
            (marketplace, false)
        }
    } else {
        let is_plugin = path.file_name().is_some_and(|n| n == "plugin.json");
        (path.to_path_buf(), is_plugin)
    };

    let result = if is_plugin {
        validate_plugin_file(&file)?
    } else {
        validate_marketplace_file(&file)?
    };
    for issue in &result.issues {
        let level = match issue.level {
            ValidationLevel::Error => "[ERROR]".red().bold(),
            ValidationLevel::Warning => "[WARN]".yellow().bold(),
        };
        println!("{} {}: {}", level, issue.path, issue.message);
    }

    if result.valid() {
        println!("{} {}", "Valid:".green(), file.display());
        return Ok(());
    }

    Err(PluginMarketError::ManifestInvalid {
        marketplace: path.display().to_string(),
        path: file,
        message: format!("{} error(s)", result.errors().count()),
    })
}

fn handle_blocklist(manager: &PluginManager) -> Result<()> {
    let blocklist = manager.blocklist()?;
    if blocklist.plugins.is_empty() {
        println!("No plugins are blocked.");
        return Ok(());
    }

    println!();
    for entry in &blocklist.plugins {
        println!(
            "  {} {} {}",
            entry.plugin.red(),
            entry.added_at.format("%Y-%m-%d").to_string().dimmed(),
            entry.reason.as_deref().unwrap_or("")
        );
    }
    println!();
    Ok(())
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(PluginMarketError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}
