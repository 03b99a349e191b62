/* 📖 # Why have pagehost_base as a core library?
pagehost_base provides the foundational error handling, tracing setup and the
Platform Abstraction Layer used by the engine and the CLI. Keeping them here
prevents circular dependencies and keeps all platform code in one place.
*/

pub mod error;
pub mod pal;
pub mod tracing;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, PageHostError, PageHostResult, ResultExt};
pub use pal::{FilePath, MockPal, Pal, PalHandle, RealPal};
