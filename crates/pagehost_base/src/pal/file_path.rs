use relative_path::{Component, RelativePath, RelativePathBuf};
use std::path::Path;

/* 📖 # Why are all PAL paths relative?

A PAL is rooted at the pages root, and every path the engine handles is
relative to it. A page bundle is `FilePath::from("alpha")`, its document is
`alpha/index.html`, and the page a watch event belongs to is the event
path's first component. Paths never escape the root by construction, as
long as `..` components are rejected where outside input enters.
*/

/// A `/`-separated path below the PAL base directory.
///
/// ```
/// use pagehost_base::FilePath;
///
/// let document = FilePath::from("alpha").join("index.html");
/// assert_eq!(document.to_string(), "alpha/index.html");
/// assert_eq!(document.first_component(), Some("alpha"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath(RelativePathBuf);

impl FilePath {
    /// The base directory itself.
    pub fn root() -> Self {
        Self(RelativePathBuf::new())
    }

    pub fn as_relative(&self) -> &RelativePath {
        &self.0
    }

    /// The same path as a std path, still relative.
    pub fn as_path(&self) -> &Path {
        Path::new(self.0.as_str())
    }

    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        Self(self.0.join(segment.as_ref()))
    }

    /// First named component; leading `.` components are skipped.
    pub fn first_component(&self) -> Option<&str> {
        self.0.components().find_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    pub fn has_parent_components(&self) -> bool {
        self.0.components().any(|component| component == Component::ParentDir)
    }

    /// Component-wise prefix test: `alpha` is a prefix of `alpha/x` but not of `alphabet`.
    pub fn starts_with(&self, prefix: &FilePath) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<&str> for FilePath {
    fn from(path: &str) -> Self {
        Self(RelativePathBuf::from(path))
    }
}

impl From<String> for FilePath {
    fn from(path: String) -> Self {
        Self(RelativePathBuf::from(path))
    }
}

/// Converts platform separators, so Windows paths from notify map cleanly.
impl From<&Path> for FilePath {
    fn from(path: &Path) -> Self {
        Self::from(path.to_string_lossy().replace('\\', "/"))
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
