use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::page::PageName;

use super::handler::HandlerModule;
use super::key::ModuleKey;

/// Live handler modules, at most one generation per page.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    modules: Arc<RwLock<HashMap<PageName, Arc<HandlerModule>>>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a module, superseding any previous generation of the same page.
    pub fn install(&self, module: HandlerModule) -> Option<Arc<HandlerModule>> {
        let page = module.page().clone();
        self.modules.write().insert(page, Arc::new(module))
    }

    /// Retire the live module of a page.
    pub fn retire(&self, page: &PageName) -> Option<Arc<HandlerModule>> {
        self.modules.write().remove(page)
    }

    pub fn get(&self, page: &PageName) -> Option<Arc<HandlerModule>> {
        self.modules.read().get(page).cloned()
    }

    /// The live module identified by `key`, if that generation is still installed.
    pub fn resolve(&self, key: &ModuleKey) -> Option<Arc<HandlerModule>> {
        self.get(key.page()).filter(|module| module.key() == key)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}
