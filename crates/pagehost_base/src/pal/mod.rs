/* 📖 # What is the Platform Abstraction Layer?

Every side effect of the page host goes through the PAL: reading page
bundles, listing and watching the pages root, running handler commands and
serving HTTP. Engine code only ever sees the `Pal` trait, so the loader,
watcher and front door run unchanged against `RealPal` in production and
`MockPal` in tests.
*/

mod file_path;
pub mod http;
pub mod mock;
mod real_http;
pub mod real_pal;
mod traits;

pub use file_path::FilePath;
pub use mock::MockPal;
pub use real_pal::RealPal;
pub use traits::{
    CommandOutput, CommandRequest, DirectoryEntry, FileChangeCallback, FileChangeEvent,
    FileChangeKind, Pal, PalHandle, ReadSeek, WatchHandle,
};
