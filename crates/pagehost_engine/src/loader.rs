/* 📖 # Why does loading never fail?

Page bundles are edited by people while the host runs. A typo in one
bundle's `backend.toml` must not keep the other pages from loading, and
must not take the host down. The loader therefore logs every problem with
the page name and degrades: a page whose handler module cannot be loaded is
still served as a plain document. Only a missing document keeps a page out
of the registry.
*/

use tracing::{debug, error, info, instrument, warn};

use pagehost_base::{FilePath, PalHandle};

use crate::module::{HandlerModule, ModuleKey, ModuleLoadError, ModuleTable};
use crate::mount::{MountTable, api_prefix};
use crate::page::{BundleLayout, PageEntry, PageName};
use crate::registry::Registry;

/// Validates page bundles and commits them to the registry.
#[derive(Debug, Clone)]
pub struct PageLoader {
    pal: PalHandle,
    layout: BundleLayout,
    registry: Registry,
    modules: ModuleTable,
    mounts: MountTable,
}

impl PageLoader {
    pub fn new(
        pal: PalHandle,
        layout: BundleLayout,
        registry: Registry,
        modules: ModuleTable,
        mounts: MountTable,
    ) -> Self {
        Self {
            pal,
            layout,
            registry,
            modules,
            mounts,
        }
    }

    /// Load one page bundle. Returns the committed entry, or `None` if the page was skipped.
    #[instrument(skip_all, fields(page = %page))]
    pub fn load(&self, page: &PageName) -> Option<PageEntry> {
        let document = self.layout.document_path(page);
        match self.pal.file_exists(&document) {
            Ok(true) => {}
            Ok(false) => {
                warn!(document = %document, "page has no document, skipping");
                return None;
            }
            Err(e) => {
                warn!(document = %document, error = %e, "cannot check page document, skipping");
                return None;
            }
        }

        let has_backend = self.load_backend(page);
        let entry = PageEntry::new(page, has_backend);
        self.registry.set(entry.clone());
        info!(has_backend, "page loaded");
        Some(entry)
    }

    /// Load, install and mount the handler module of a page, if it has one.
    fn load_backend(&self, page: &PageName) -> bool {
        let backend = self.layout.backend_path(page);
        match self.pal.file_exists(&backend) {
            Ok(true) => {}
            Ok(false) => {
                debug!("page has no handler module");
                self.modules.retire(page);
                return false;
            }
            Err(e) => {
                error!(module = %backend, error = %e, "cannot check handler module");
                self.modules.retire(page);
                return false;
            }
        }

        let key = ModuleKey::next(page);
        match HandlerModule::load(&self.pal, key.clone(), self.layout.page_dir(page), &backend) {
            Ok(module) => {
                let routes = module.routes().len();
                self.modules.install(module);
                self.mounts.mount(key.clone());
                info!(
                    module = %key.module_name(),
                    generation = key.generation(),
                    prefix = %api_prefix(page),
                    routes,
                    "handler module mounted"
                );
                true
            }
            Err(ModuleLoadError::MissingRouter) => {
                warn!(module = %backend, "handler module exposes no router, serving document only");
                self.modules.retire(page);
                false
            }
            Err(e) => {
                error!(module = %backend, error = %e, "failed to load handler module, serving document only");
                self.modules.retire(page);
                false
            }
        }
    }

    /// Load every page directory below the pages root, in name order.
    ///
    /// Returns the number of pages registered. An inaccessible root registers nothing.
    pub fn scan(&self) -> usize {
        let entries = match self.pal.list_directory(&FilePath::root()) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "pages root is not accessible, no pages registered");
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries.into_iter().filter(|entry| entry.is_directory) {
            let Some(page) = PageName::new(&entry.name) else {
                debug!(directory = %entry.name, "skipping directory that is not a page");
                continue;
            };
            if self.load(&page).is_some() {
                loaded += 1;
            }
        }
        info!(pages = loaded, "page scan finished");
        loaded
    }
}
