/* 📖 # What does pagehost_engine contain?

Everything that makes a directory of page bundles into a running site:
configuration, the page registry, handler modules and their mounts, the
loader and unloader, the filesystem watcher and the HTTP front door. All
side effects go through the PAL from pagehost_base, so every component can
be exercised against MockPal.
*/

pub mod api;
pub mod config;
pub mod host;
pub mod loader;
pub mod module;
pub mod mount;
pub mod page;
pub mod registry;
pub mod unloader;
pub mod watcher;

pub use api::PageService;
pub use config::{Config, DEFAULT_CONFIG_FILE, load_config, parse_config};
pub use host::{PageHost, RunningPageHost};
pub use loader::PageLoader;
pub use module::{HandlerModule, ModuleKey, ModuleLoadError, ModuleTable};
pub use mount::MountTable;
pub use page::{BundleLayout, PageEntry, PageName};
pub use registry::Registry;
pub use unloader::PageUnloader;
pub use watcher::{PageWatcher, WatchAction, WatchProcessor};
