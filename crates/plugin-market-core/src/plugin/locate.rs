//! Plugin directory resolution
//!
//! A plugin's on-disk directory is found by trying an ordered list of
//! candidates. Externally sourced plugins live only in the plugin cache;
//! relative plugins live somewhere inside the marketplace tree.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::plugin::types::{MarketplaceManifest, PluginEntry, PluginSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathCandidate {
    /// `plugin-cache/<marketplace>/<plugin>`
    PluginCache,
    /// Declared source path, relative to the marketplace root (and pluginRoot)
    Declared(PathBuf),
    /// `plugins/<name>`
    PluginsDir,
    /// `external_plugins/<name>`
    ExternalPluginsDir,
    /// The marketplace root itself
    MarketplaceRoot,
}

/// Candidates to try, in order, for a manifest entry
pub fn candidates(manifest: &MarketplaceManifest, entry: &PluginEntry) -> Vec<PathCandidate> {
    match &entry.source {
        PluginSource::External(_) => vec![PathCandidate::PluginCache],
        PluginSource::Relative(rel) => {
            let mut declared = PathBuf::new();
            if let Some(root) = manifest.plugin_root() {
                declared.push(trim_dot_slash(root));
            }
            declared.push(trim_dot_slash(rel));

            vec![
                PathCandidate::Declared(declared),
                PathCandidate::PluginsDir,
                PathCandidate::ExternalPluginsDir,
                PathCandidate::MarketplaceRoot,
            ]
        }
    }
}

/// First candidate that exists. Relative candidates must stay inside the
/// marketplace root after canonicalization.
pub fn resolve(
    candidates: &[PathCandidate],
    plugin: &str,
    marketplace_root: &Path,
    plugin_cache: &Path,
) -> Option<PathBuf> {
    candidates.iter().find_map(|candidate| {
        let path = match candidate {
            PathCandidate::PluginCache => {
                return plugin_cache.is_dir().then(|| plugin_cache.to_path_buf());
            }
            PathCandidate::Declared(rel) => marketplace_root.join(rel),
            PathCandidate::PluginsDir => marketplace_root.join("plugins").join(plugin),
            PathCandidate::ExternalPluginsDir => {
                marketplace_root.join("external_plugins").join(plugin)
            }
            PathCandidate::MarketplaceRoot => marketplace_root.to_path_buf(),
        };

        if !path.is_dir() {
            debug!(candidate = ?candidate, path = %path.display(), "candidate missing");
            return None;
        }
        if !is_within(&path, marketplace_root) {
            warn!(path = %path.display(), "plugin path escapes marketplace root, skipping");
            return None;
        }
        Some(path)
    })
}

fn is_within(path: &Path, root: &Path) -> bool {
    match (path.canonicalize(), root.canonicalize()) {
        (Ok(path), Ok(root)) => path.starts_with(root),
        _ => false,
    }
}

fn trim_dot_slash(path: &str) -> &str {
    path.trim_start_matches("./")
}
