use std::fs;
use std::path::Path;

use plugin_market_core::config::Config;
use plugin_market_core::plugin::{SettingsFile, SettingsLedger};
use plugin_market_core::{
    MarketplaceSource, PluginManager, PluginMarketError, Scope, ScopeFilter,
};
use tempfile::TempDir;

fn write_marketplace(dir: &Path, plugin_version: &str) {
    fs::create_dir_all(dir.join(".claude-plugin")).unwrap();
    fs::write(
        dir.join(".claude-plugin/marketplace.json"),
        format!(
            r#"{{
                "name": "team-tools",
                "owner": {{"name": "Team"}},
                "metadata": {{"description": "Shared tooling", "pluginRoot": "./packages"}},
                "plugins": [
                    {{"name": "reviewer", "source": "./reviewer", "version": "{}", "category": "quality"}},
                    {{"name": "remote", "source": {{"source": "url", "url": "https://example.invalid/remote.git"}}}}
                ]
            }}"#,
            plugin_version
        ),
    )
    .unwrap();

    let plugin = dir.join("packages/reviewer/.claude-plugin");
    fs::create_dir_all(&plugin).unwrap();
    fs::write(
        plugin.join("plugin.json"),
        r#"{"name": "reviewer", "version": "1.0.0"}"#,
    )
    .unwrap();
}

fn config_for(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config
        .set(
            "paths.plugins_dir",
            temp.path().join("plugins").to_str().unwrap(),
        )
        .unwrap();
    config
        .set(
            "paths.user_settings",
            temp.path().join("home/settings.json").to_str().unwrap(),
        )
        .unwrap();
    config.set("fetch.git_timeout_secs", "20").unwrap();
    config
}

#[test]
fn directory_marketplace_end_to_end() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let project = temp.path().join("project");
    write_marketplace(&source, "1.0.0");

    let manager = PluginManager::from_config(&config_for(&temp), Some(&project)).unwrap();
    assert_eq!(
        manager.configured_scopes(),
        vec![Scope::User, Scope::Project, Scope::Local]
    );

    let (name, manifest) = manager
        .add_marketplace(source.to_str().unwrap(), None, None)
        .unwrap();
    assert_eq!(name, "team-tools");
    assert_eq!(manifest.plugins.len(), 2);

    let registry = fs::read_to_string(temp.path().join("plugins/known_marketplaces.json")).unwrap();
    assert!(registry.contains("\"installLocation\""));
    assert!(matches!(
        manager.list_marketplaces().unwrap()["team-tools"].source,
        MarketplaceSource::Directory { .. }
    ));

    manager.install("reviewer", &name, Scope::Project).unwrap();
    manager.install("reviewer", &name, Scope::User).unwrap();
    manager.disable("reviewer", &name, Scope::User).unwrap();

    let settings = project.join(".claude/settings.json");
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&settings).unwrap()).unwrap();
    assert_eq!(raw["enabledPlugins"]["reviewer@team-tools"], true);

    let dir = manager.plugin_dir("reviewer", &name).unwrap().unwrap();
    assert!(dir.ends_with("packages/reviewer"));

    // Up to date until the marketplace publishes a new version
    assert!(manager.check_all_updates().unwrap().iter().all(|r| !r.has_update));
    write_marketplace(&source, "1.2.0");
    manager.refresh_marketplace(&name).unwrap();

    let updates = manager.check_all_updates().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].has_update);
    assert_eq!(updates[0].latest_version.as_deref(), Some("1.2.0"));

    manager.uninstall("reviewer", &name, Scope::Project).unwrap();
    manager.uninstall("reviewer", &name, Scope::User).unwrap();
    assert!(manager.list_installed(ScopeFilter::All).unwrap().is_empty());

    manager.remove_marketplace(&name).unwrap();
    assert!(manager.list_marketplaces().unwrap().is_empty());
    assert!(!temp.path().join("plugins/marketplaces/team-tools").exists());
}

#[test]
fn failed_plugin_fetch_leaves_ledger_untouched() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    write_marketplace(&source, "1.0.0");

    let manager = PluginManager::from_config(&config_for(&temp), None).unwrap();
    let (name, _) = manager
        .add_marketplace(source.to_str().unwrap(), Some("tools"), None)
        .unwrap();
    assert_eq!(name, "tools");

    let user = SettingsFile::new(temp.path().join("home/settings.json"));
    fs::create_dir_all(temp.path().join("home")).unwrap();
    fs::write(user.path(), r#"{"theme": "light"}"#).unwrap();

    // git is either missing or cannot reach the host; both are fetch failures
    let err = manager.install("remote", "tools", Scope::User).unwrap_err();
    assert!(matches!(err, PluginMarketError::Fetch { .. }));
    assert!(user.load_enabled_plugins().unwrap().is_empty());
    assert!(!manager.plugin_cache_path("tools", "remote").unwrap().exists());

    let err = manager.install("reviewer", "tools", Scope::Local).unwrap_err();
    assert!(err.is_usage_error());
}

#[test]
fn corrupt_registry_fails_closed() {
    let temp = TempDir::new().unwrap();
    let manager = PluginManager::from_config(&config_for(&temp), None).unwrap();

    fs::create_dir_all(temp.path().join("plugins")).unwrap();
    fs::write(temp.path().join("plugins/known_marketplaces.json"), "{").unwrap();

    assert!(matches!(
        manager.list_marketplaces(),
        Err(PluginMarketError::ConfigParse { .. })
    ));
}
