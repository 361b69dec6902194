//! Manifest validation
//!
//! Structural checks over raw JSON, reported as a list of issues instead of
//! failing on the first problem. Warnings never make a manifest invalid.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{PluginMarketError, Result};

/// Marketplace names that third-party catalogs may not claim
pub const RESERVED_MARKETPLACE_NAMES: &[&str] = &[
    "claude-code-marketplace",
    "claude-code-plugins",
    "claude-plugins-official",
    "anthropic-marketplace",
    "anthropic-plugins",
    "agent-skills",
    "life-sciences",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Error,
    Warning,
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single finding, with the JSON path it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.level == ValidationLevel::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.level == ValidationLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.level == ValidationLevel::Warning)
    }
}

/// Validate a parsed marketplace.json document
pub fn validate_marketplace(data: &Value) -> ValidationResult {
    let mut issues = Vec::new();

    match data.get("name") {
        None | Some(Value::Null) => issues.push(ValidationIssue::error("name", "name: Required")),
        Some(Value::String(name)) if is_reserved(name) => issues.push(ValidationIssue::error(
            "name",
            format!("Marketplace name \"{}\" is reserved", name),
        )),
        Some(_) => {}
    }

    if matches!(data.get("owner"), None | Some(Value::Null)) {
        issues.push(ValidationIssue::error("owner", "owner: Required"));
    }

    match data.get("plugins") {
        None | Some(Value::Null) => {
            issues.push(ValidationIssue::error("plugins", "plugins: Required"))
        }
        Some(Value::Array(plugins)) if plugins.is_empty() => issues.push(
            ValidationIssue::warning("plugins", "Marketplace has no plugins defined"),
        ),
        Some(Value::Array(plugins)) => validate_plugin_entries(plugins, &mut issues),
        Some(_) => {}
    }

    let description = data
        .get("metadata")
        .and_then(|m| m.get("description"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if description.is_empty() {
        issues.push(ValidationIssue::warning(
            "metadata.description",
            "No marketplace description provided.",
        ));
    }

    ValidationResult { issues }
}

fn validate_plugin_entries(plugins: &[Value], issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();

    for (i, entry) in plugins.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            continue;
        };

        let name = entry.get("name").and_then(Value::as_str);
        if let Some(name) = name {
            if !seen.insert(name) {
                issues.push(ValidationIssue::error(
                    format!("plugins[{}].name", i),
                    format!("Duplicate plugin name \"{}\" found in marketplace", name),
                ));
            }
        }

        let path = format!("plugins[{}].source", i);
        match entry.get("source") {
            Some(Value::String(source)) if source.contains("..") => {
                issues.push(ValidationIssue::error(path, "Path traversal not allowed"));
            }
            Some(Value::Object(source)) => {
                let kind = source.get("source").and_then(Value::as_str);
                if let Some(kind @ ("npm" | "pip")) = kind {
                    let label = name.map(str::to_string).unwrap_or_else(|| format!("plugins[{}]", i));
                    issues.push(ValidationIssue::warning(
                        path,
                        format!(
                            "Plugin \"{}\" uses {} source which is not yet fully implemented",
                            label, kind
                        ),
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Validate a parsed plugin.json document
pub fn validate_plugin(data: &Value) -> ValidationResult {
    let mut issues = Vec::new();

    let name = data.get("name").and_then(Value::as_str).map(str::trim);
    if name.map_or(true, str::is_empty) {
        issues.push(ValidationIssue::error("name", "name: Required"));
    }

    ValidationResult { issues }
}

/// Load a marketplace.json file and validate it
pub fn validate_marketplace_file(path: &Path) -> Result<ValidationResult> {
    Ok(validate_marketplace(&read_document(path)?))
}

/// Load a plugin.json file and validate it
pub fn validate_plugin_file(path: &Path) -> Result<ValidationResult> {
    Ok(validate_plugin(&read_document(path)?))
}

fn read_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| PluginMarketError::load(path, e))?;
    serde_json::from_str(&content).map_err(|e| PluginMarketError::load(path, e))
}

fn is_reserved(name: &str) -> bool {
    let normalized = name.trim().to_lowercase();
    RESERVED_MARKETPLACE_NAMES.contains(&normalized.as_str())
}
