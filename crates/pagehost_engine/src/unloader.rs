use tracing::{debug, info, instrument};

use crate::module::ModuleTable;
use crate::mount::api_prefix;
use crate::page::PageName;
use crate::registry::Registry;

/// Removes pages from the registry and retires their handler modules.
///
/// The `/<name>/api` mount is left in place and answers 404 from now on.
#[derive(Debug, Clone)]
pub struct PageUnloader {
    registry: Registry,
    modules: ModuleTable,
}

impl PageUnloader {
    pub fn new(registry: Registry, modules: ModuleTable) -> Self {
        Self { registry, modules }
    }

    /// Unload a page. Unloading an unknown page is a no-op. Returns whether the page was registered.
    #[instrument(skip_all, fields(page = %page))]
    pub fn unload(&self, page: &PageName) -> bool {
        let entry = self.registry.delete(page);
        let module = self.modules.retire(page);
        if entry.is_none() && module.is_none() {
            debug!("page was not loaded");
            return false;
        }
        match module {
            Some(module) => info!(
                module = %module.key(),
                prefix = %api_prefix(page),
                "page unloaded, API prefix stays mounted and answers 404"
            ),
            None => info!("page unloaded"),
        }
        entry.is_some()
    }
}
