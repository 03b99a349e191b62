use std::sync::atomic::{AtomicU64, Ordering};

use crate::page::PageName;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identity of one loaded handler module: `pages.<name>.backend` plus a load generation.
///
/// Generations increase process-wide, so no two loads ever share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    page: PageName,
    generation: u64,
}

impl ModuleKey {
    /// Allocate a fresh key for a new load of `page`.
    pub fn next(page: &PageName) -> Self {
        Self {
            page: page.clone(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn page(&self) -> &PageName {
        &self.page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Module name without the generation, e.g. `pages.beta.backend`.
    pub fn module_name(&self) -> String {
        format!("pages.{}.backend", self.page)
    }
}

impl std::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.module_name(), self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique_per_load() {
        let page = PageName::new("beta").unwrap();
        let first = ModuleKey::next(&page);
        let second = ModuleKey::next(&page);

        assert_ne!(first, second);
        assert!(second.generation() > first.generation());
        assert_eq!(first.module_name(), "pages.beta.backend");
        assert_eq!(second.to_string(), format!("pages.beta.backend#{}", second.generation()));
    }
}
