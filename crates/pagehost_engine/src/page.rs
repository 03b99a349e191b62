use serde::Serialize;

use pagehost_base::FilePath;

use crate::config::Config;

/// Path segment reserved for the discovery endpoint.
pub const DISCOVERY_SEGMENT: &str = "__pages__";

/// Validated name of a page, equal to its directory name under the pages root.
///
/// A valid name is non-empty, contains no path separator, does not start
/// with `.` and is not the discovery segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageName(String);

impl PageName {
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.contains(['/', '\\'])
            && !name.starts_with('.')
            && name != DISCOVERY_SEGMENT;
        valid.then_some(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Registry metadata of a loaded page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageEntry {
    pub name: String,
    /// Whether a handler module was loaded and mounted for this generation.
    pub has_backend: bool,
}

impl PageEntry {
    pub fn new(name: &PageName, has_backend: bool) -> Self {
        Self {
            name: name.as_str().to_string(),
            has_backend,
        }
    }
}

/// File names making up a page bundle, relative to the pages root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub document_file: String,
    pub backend_file: String,
}

impl BundleLayout {
    pub fn from_config(config: &Config) -> Self {
        Self {
            document_file: config.document_file.clone(),
            backend_file: config.backend_file.clone(),
        }
    }

    pub fn page_dir(&self, page: &PageName) -> FilePath {
        FilePath::from(page.as_str())
    }

    pub fn document_path(&self, page: &PageName) -> FilePath {
        self.page_dir(page).join(&self.document_file)
    }

    pub fn backend_path(&self, page: &PageName) -> FilePath {
        self.page_dir(page).join(&self.backend_file)
    }
}

impl Default for BundleLayout {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
