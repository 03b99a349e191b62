/* 📖 # Why is the CLI minimal?

The CLI takes at most one argument, the path of a config file. Without it,
`pagehost.toml` is read from the current directory if present, and built-in
defaults apply otherwise. Everything else (pages root, listener) comes from
the config file or the `PAGEHOST_*` environment variables.

The workflow is straightforward:
1. Put one directory per page below `pages/`
2. Run `pagehost`
3. Add, edit or remove page directories while it runs

Exit codes:
- 0: Server stopped by Ctrl-C
- 1: Error (unreadable config, listener could not be bound)
*/

use std::env;
use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;

use tracing::{error, info};

use pagehost_base::tracing::init_tracing;
use pagehost_base::{FilePath, PageHostResult, PalHandle, RealPal, ResultExt, err};
use pagehost_engine::{Config, DEFAULT_CONFIG_FILE, PageHost, load_config};

fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("Error: Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run() {
        error!(error = ?e, "page host failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> PageHostResult<()> {
    let current_dir = env::current_dir().map_err(|e| err!("Failed to get current directory: {}", e))?;
    let config = read_config(&current_dir)?;

    let pages_root = current_dir.join(&config.pages_root);
    info!(pages_root = %pages_root.display(), "starting page host");

    let pal = PalHandle::new(RealPal::new(pages_root));
    let running = PageHost::new(pal, config).start()?;

    let shutdown = running.shutdown_flag();
    ctrlc::set_handler(move || {
        info!("shutting down");
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|e| err!("Failed to set Ctrl-C handler: {}", e))?;

    running.wait();
    Ok(())
}

/// Load the config named on the command line, or the default file if it exists.
///
/// A relative `pages_root` from a config file is taken relative to that file.
/// One from `PAGEHOST_PAGES_ROOT` is taken relative to the current directory.
fn read_config(current_dir: &Path) -> PageHostResult<Config> {
    let config = match env::args().nth(1) {
        Some(path) => {
            let path = current_dir.join(path);
            let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
                return Err(err!("Invalid config path: {}", path.display()));
            };
            let pal = PalHandle::new(RealPal::new(dir.to_path_buf()));
            anchor_pages_root(load_config(&pal, &FilePath::from(Path::new(file_name)), true)?, dir)
        }
        None => {
            let pal = PalHandle::new(RealPal::new(current_dir.to_path_buf()));
            load_config(&pal, &FilePath::from(DEFAULT_CONFIG_FILE), false)?
        }
    };
    config
        .with_overrides(|key| env::var(key).ok())
        .context("Invalid environment override")
}

fn anchor_pages_root(mut config: Config, config_dir: &Path) -> Config {
    config.pages_root = config_dir.join(&config.pages_root).to_string_lossy().into_owned();
    config
}
