/* 📖 # Why one mutex around a BTreeMap?

The registry is written by the watcher thread and read by every HTTP worker.
Operations are tiny map lookups, so a single parking_lot mutex held for the
duration of one operation is enough, and never held across file or network
I/O. A BTreeMap keeps names ordered, so the discovery snapshot is sorted
without an extra pass.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::page::{PageEntry, PageName};

/// Shared registry of currently loaded pages. Cloning yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pages: Arc<Mutex<BTreeMap<String, PageEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry of a page.
    pub fn set(&self, entry: PageEntry) {
        self.pages.lock().insert(entry.name.clone(), entry);
    }

    /// Remove a page, returning its entry if it was present.
    pub fn delete(&self, name: &PageName) -> Option<PageEntry> {
        self.pages.lock().remove(name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<PageEntry> {
        self.pages.lock().get(name).cloned()
    }

    /// Owned copy of all entries, sorted by name.
    pub fn snapshot(&self) -> Vec<PageEntry> {
        self.pages.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn name(name: &str) -> PageName {
        PageName::new(name).unwrap()
    }

    #[test]
    fn test_set_get_delete() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        registry.set(PageEntry::new(&name("alpha"), false));
        assert!(registry.contains("alpha"));
        assert_eq!(registry.get("alpha"), Some(PageEntry::new(&name("alpha"), false)));

        registry.set(PageEntry::new(&name("alpha"), true));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("alpha").unwrap().has_backend);

        assert!(registry.delete(&name("alpha")).is_some());
        assert!(registry.delete(&name("alpha")).is_none());
        assert!(!registry.contains("alpha"));
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let registry = Registry::new();
        for page in ["gamma", "alpha", "beta"] {
            registry.set(PageEntry::new(&name(page), false));
        }

        let snapshot = registry.snapshot();
        registry.delete(&name("beta"));

        let names: Vec<&str> = snapshot.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_writers() {
        let registry = Registry::new();
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for j in 0..50 {
                        registry.set(PageEntry::new(&name(&format!("page-{i}-{j}")), j % 2 == 0));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
