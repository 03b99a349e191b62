/* 📖 # Why key modules by page and generation?

Every load of a page's handler module produces a brand-new, immutable
`HandlerModule` with its own `ModuleKey`. Nothing is patched in place: a
reload installs the new generation and the old one disappears as soon as
the last in-flight request holding its `Arc` finishes. Mounts refer to a
key rather than to a module, so a mount whose generation is no longer
installed resolves to nothing.
*/

mod handler;
mod key;
mod manifest;
mod pattern;
mod responder;
mod table;

use pagehost_base::PageHostError;

pub use handler::{HandlerModule, ModuleRequest};
pub use key::ModuleKey;
pub use manifest::Route;
pub use pattern::PathPattern;
pub use responder::Responder;
pub use table::ModuleTable;

/// Why a handler module could not be loaded.
#[derive(Debug)]
pub enum ModuleLoadError {
    /// The file could not be read.
    Read(Box<PageHostError>),
    /// The file is not valid TOML.
    Parse(String),
    /// The file parsed but a route is unusable.
    Invalid(String),
    /// The file has no `router` table.
    MissingRouter,
}

impl std::fmt::Display for ModuleLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleLoadError::Read(error) => write!(f, "failed to read handler module: {error}"),
            ModuleLoadError::Parse(message) => write!(f, "invalid TOML in handler module: {message}"),
            ModuleLoadError::Invalid(message) => write!(f, "invalid handler module: {message}"),
            ModuleLoadError::MissingRouter => write!(f, "handler module exposes no router"),
        }
    }
}

impl std::error::Error for ModuleLoadError {}
