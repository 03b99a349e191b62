/* 📖 # Why are mounts never removed?

Route mounts behave like routes registered on a running web framework:
they can be added or re-pointed, not withdrawn. An unloaded page keeps its
`/<name>/api` prefix. The mount still names the retired module's key, the
module table no longer holds that generation, and requests resolve to 404.
Reloading a page re-points its mount to the new generation, so stale routes
of a superseded module are never served.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::module::ModuleKey;
use crate::page::PageName;

/// URL prefix of a page's handler module.
pub fn api_prefix(page: &PageName) -> String {
    format!("/{page}/api")
}

/// Mapping from URL prefix to the handler module mounted there.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Arc<RwLock<BTreeMap<String, ModuleKey>>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `key` under its page's prefix, returning the previously mounted key.
    pub fn mount(&self, key: ModuleKey) -> Option<ModuleKey> {
        self.mounts.write().insert(api_prefix(key.page()), key)
    }

    pub fn resolve(&self, prefix: &str) -> Option<ModuleKey> {
        self.mounts.read().get(prefix).cloned()
    }

    /// All mounted prefixes in order, including those of unloaded pages.
    pub fn prefixes(&self) -> Vec<String> {
        self.mounts.read().keys().cloned().collect()
    }
}
