/* 📖 # Why a composition root?

The registry, module table and mount table are shared by the loader, the
unloader, the watcher and the front door. `PageHost` creates them once and
hands clones of the same handles to every component. Startup order matters:
the initial scan finishes before the watcher is armed, and both happen
before the HTTP server accepts its first connection. The first request
therefore never sees a half-populated registry.
*/

use tracing::{error, info};

use pagehost_base::pal::http::HttpServerHandle;
use pagehost_base::{PageHostResult, PalHandle, ResultExt};

use crate::api::PageService;
use crate::config::Config;
use crate::loader::PageLoader;
use crate::module::ModuleTable;
use crate::mount::MountTable;
use crate::page::BundleLayout;
use crate::registry::Registry;
use crate::unloader::PageUnloader;
use crate::watcher::{PageWatcher, WatchProcessor};

/// A page host over the pages root the PAL is based at.
#[derive(Debug, Clone)]
pub struct PageHost {
    pal: PalHandle,
    config: Config,
    registry: Registry,
    loader: PageLoader,
    unloader: PageUnloader,
    service: PageService,
}

impl PageHost {
    /// Wire up all components. `pal` must resolve paths relative to the pages root.
    pub fn new(pal: PalHandle, config: Config) -> Self {
        let layout = BundleLayout::from_config(&config);
        let registry = Registry::new();
        let modules = ModuleTable::new();
        let mounts = MountTable::new();
        let loader = PageLoader::new(
            pal.clone(),
            layout.clone(),
            registry.clone(),
            modules.clone(),
            mounts.clone(),
        );
        let unloader = PageUnloader::new(registry.clone(), modules.clone());
        let service = PageService::new(pal.clone(), layout, registry.clone(), modules, mounts)
            .with_command_timeout(config.command_timeout());
        Self {
            pal,
            config,
            registry,
            loader,
            unloader,
            service,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &PageLoader {
        &self.loader
    }

    pub fn unloader(&self) -> &PageUnloader {
        &self.unloader
    }

    /// The HTTP front door, for serving through a PAL or calling directly.
    pub fn service(&self) -> &PageService {
        &self.service
    }

    /// Build the watch processor applying file changes to this host.
    pub fn watch_processor(&self) -> PageHostResult<WatchProcessor> {
        WatchProcessor::new(
            self.pal.clone(),
            BundleLayout::from_config(&self.config),
            &self.config.ignore,
            self.loader.clone(),
            self.unloader.clone(),
        )
    }

    /// Scan the pages root, arm the watcher, then start serving.
    ///
    /// A pages root that cannot be scanned or watched is logged and the host
    /// starts anyway. Failing to start the HTTP server is an error.
    pub fn start(self) -> PageHostResult<RunningPageHost> {
        let pages = self.loader.scan();
        info!(pages, "initial scan complete");

        let watcher = match self.watch_processor() {
            Ok(processor) => match PageWatcher::start(&self.pal, processor, self.config.debounce()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    error!(error = %e, "cannot watch pages root, changes will not be picked up");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "invalid ignore patterns, changes will not be picked up");
                None
            }
        };

        let server = self
            .pal
            .start_http_server(Box::new(self.service.clone()), self.config.server_config())
            .with_context(|| format!("Failed to start HTTP server on {}", self.config.server_config().address()))?;
        info!(port = server.port(), "page host started");

        Ok(RunningPageHost {
            host: self,
            watcher,
            server,
        })
    }
}

/// A started page host. Dropping it stops watching and serving.
#[derive(Debug)]
pub struct RunningPageHost {
    host: PageHost,
    watcher: Option<PageWatcher>,
    server: HttpServerHandle,
}

impl RunningPageHost {
    pub fn host(&self) -> &PageHost {
        &self.host
    }

    /// Port the HTTP server listens on.
    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Flag that stops the HTTP server when set, for signal handlers.
    pub fn shutdown_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.server.shutdown_flag().clone()
    }

    /// Block until the HTTP server has shut down, then stop the watcher.
    pub fn wait(self) {
        self.server.wait();
        if let Some(watcher) = self.watcher {
            watcher.stop();
        }
        info!("page host stopped");
    }

    /// Stop serving and watching.
    pub fn shutdown(self) {
        self.server.shutdown();
        self.wait();
    }
}
