//! Blocklist
//!
//! Read-only denylist of "plugin@marketplace" keys, refreshed out of band.

use std::path::PathBuf;

use crate::error::Result;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::store::read_json;
use crate::plugin::types::BlocklistFile;

const BLOCKLIST_FILE: &str = "blocklist.json";

pub trait BlocklistSource {
    fn load_blocklist(&self) -> Result<BlocklistFile>;
}

impl PluginRegistry {
    /// Path of blocklist.json
    pub fn blocklist_file(&self) -> PathBuf {
        self.plugins_dir().join(BLOCKLIST_FILE)
    }
}

/// A missing file means nothing is blocked; an unreadable one is an error
impl BlocklistSource for PluginRegistry {
    fn load_blocklist(&self) -> Result<BlocklistFile> {
        Ok(read_json(&self.blocklist_file())?.unwrap_or_default())
    }
}

impl BlocklistSource for BlocklistFile {
    fn load_blocklist(&self) -> Result<BlocklistFile> {
        Ok(self.clone())
    }
}
