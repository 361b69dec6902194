//! Plugin Fetcher
//!
//! Materializes a source into a local directory: git clones for GitHub and
//! git URLs, a downloaded marketplace.json for HTTP, and the path itself for
//! local directories.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::error::{PluginMarketError, Result};
use crate::plugin::store::atomic_write;
use crate::plugin::types::MarketplaceSource;

/// Number of leading hex digits compared when pinning a commit
const SHA_PREFIX_LEN: usize = 7;

/// Fetch port
pub trait Fetcher {
    fn fetch(&self, source: &MarketplaceSource) -> Result<FetchedDir>;
}

/// A fetched tree. Temporary trees are removed when dropped.
#[derive(Debug)]
pub enum FetchedDir {
    Local(PathBuf),
    Temp(TempDir),
}

impl FetchedDir {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Temp(dir) => dir.path(),
        }
    }
}

/// Fetcher backed by the git CLI and a blocking HTTP client
pub struct DefaultFetcher {
    git_timeout: Duration,
    http: reqwest::blocking::Client,
}

impl DefaultFetcher {
    pub fn new(git_timeout: Duration, http_timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(http_timeout)
            .user_agent(concat!("plugin-market/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginMarketError::fetch("http", e))?;

        Ok(Self { git_timeout, http })
    }

    fn fetch_git(&self, url: &str, git_ref: Option<&str>, sha: Option<&str>) -> Result<FetchedDir> {
        // git accepts an existing empty directory as the clone target
        let temp = TempDir::new()?;

        info!(url, ?git_ref, "cloning repository");
        self.git_clone(url, temp.path(), git_ref)?;

        if let Some(expected) = sha {
            verify_sha(url, temp.path(), expected)?;
        }

        Ok(FetchedDir::Temp(temp))
    }

    fn git_clone(&self, url: &str, target: &Path, git_ref: Option<&str>) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1", "--quiet"]);
        if let Some(git_ref) = git_ref {
            cmd.args(["--branch", git_ref]);
        }
        cmd.arg(url)
            .arg(target)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => PluginMarketError::fetch(url, "git is not installed or not in PATH"),
            _ => PluginMarketError::fetch(url, e),
        })?;

        // Drain stderr while waiting so a chatty git never blocks on a full pipe
        let stderr = child.stderr.take();
        let drain = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let status = match child.wait_timeout(self.git_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                // Not joined: a surviving git helper may still hold the pipe open
                return Err(PluginMarketError::fetch(
                    url,
                    format!("git clone timed out after {}s", self.git_timeout.as_secs()),
                ));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PluginMarketError::fetch(url, e));
            }
        };

        let stderr = drain.join().unwrap_or_default();
        if !status.success() {
            return Err(PluginMarketError::fetch(
                url,
                format!("git clone failed: {}", stderr.trim()),
            ));
        }

        Ok(())
    }

    fn fetch_http(&self, url: &str) -> Result<FetchedDir> {
        info!(url, "downloading marketplace manifest");

        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| PluginMarketError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginMarketError::fetch(url, format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .map_err(|e| PluginMarketError::fetch(url, format!("invalid JSON: {}", e)))?;

        let temp = TempDir::new()?;
        let manifest_path = temp.path().join(".claude-plugin").join("marketplace.json");
        let content = serde_json::to_string_pretty(&body)
            .map_err(|e| PluginMarketError::fetch(url, e))?;
        atomic_write(&manifest_path, &content)?;

        Ok(FetchedDir::Temp(temp))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, source: &MarketplaceSource) -> Result<FetchedDir> {
        debug!(%source, "fetching");

        match source {
            MarketplaceSource::Github { repo, r#ref, sha } => {
                let url = format!("https://github.com/{}.git", repo);
                self.fetch_git(&url, r#ref.as_deref(), sha.as_deref())
            }
            MarketplaceSource::Git { url, r#ref, sha } => {
                self.fetch_git(url, r#ref.as_deref(), sha.as_deref())
            }
            MarketplaceSource::Http { url } => self.fetch_http(url),
            MarketplaceSource::Directory { path } => fetch_directory(path),
            MarketplaceSource::HostPattern { host_pattern } => Err(PluginMarketError::fetch(
                host_pattern.clone(),
                "hostPattern sources cannot be fetched",
            )),
        }
    }
}

fn fetch_directory(path: &Path) -> Result<FetchedDir> {
    if !path.is_dir() {
        return Err(PluginMarketError::fetch(
            path.display().to_string(),
            "directory does not exist",
        ));
    }
    Ok(FetchedDir::Local(path.to_path_buf()))
}

fn verify_sha(url: &str, repo: &Path, expected: &str) -> Result<()> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["rev-parse", "HEAD"])
        .output()
        .map_err(|e| PluginMarketError::fetch(url, e))?;

    if !output.status.success() {
        return Err(PluginMarketError::fetch(url, "git rev-parse HEAD failed"));
    }

    let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let prefix: String = expected.chars().take(SHA_PREFIX_LEN).collect();

    if !head.starts_with(&prefix) {
        return Err(PluginMarketError::fetch(
            url,
            format!("SHA mismatch: expected {}, got {}", expected, head),
        ));
    }

    Ok(())
}
