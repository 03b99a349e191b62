/* 📖 # Why integrate file watching through the PAL?

The watcher keeps the registry in step with the pages root while the host
runs, but delegates the actual filesystem watching to the PAL. RealPal
forwards notify events, MockPal lets tests emit events by hand.

The PAL callback runs on a notify thread and does nothing but push the event
into a channel. One consumer thread owns all loading and unloading, so
actions are applied strictly in delivery order and never race each other.
*/

/* 📖 # Why decide actions from disk state instead of event kinds alone?

Editors and file managers produce very different event sequences for the
same user action (write to temp file and rename, truncate and write, delete
and recreate). Raw events are only a hint that something below a page
directory changed. The watcher looks at the directory and its document when
it processes a batch and derives Load, Reload or Unload from what is there.
Because of that, collapsing repeated actions in a burst never skips a
state transition.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};

use pagehost_base::pal::{FileChangeEvent, FileChangeKind, WatchHandle};
use pagehost_base::{FilePath, PageHostResult, PalHandle, err};

use crate::loader::PageLoader;
use crate::page::{BundleLayout, PageName};
use crate::unloader::PageUnloader;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the watcher does to a page in response to file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Load(PageName),
    /// Unload, then load again.
    Reload(PageName),
    Unload(PageName),
}

/// Maps raw change events to page actions and applies them.
#[derive(Debug, Clone)]
pub struct WatchProcessor {
    pal: PalHandle,
    layout: BundleLayout,
    ignore: GlobSet,
    loader: PageLoader,
    unloader: PageUnloader,
}

impl WatchProcessor {
    pub fn new(
        pal: PalHandle,
        layout: BundleLayout,
        ignore: &[String],
        loader: PageLoader,
        unloader: PageUnloader,
    ) -> PageHostResult<Self> {
        Ok(Self {
            pal,
            layout,
            ignore: build_glob_set(ignore)?,
            loader,
            unloader,
        })
    }

    /// Decide what a single event means for its page, based on the current disk state.
    pub fn classify(&self, event: &FileChangeEvent) -> Option<WatchAction> {
        if event.path.has_parent_components() {
            debug!(path = %event.path, "ignoring event outside the pages root");
            return None;
        }
        let page = PageName::new(event.path.first_component()?)?;
        if self.is_ignored(&event.path) {
            debug!(path = %event.path, "ignoring event on ignored file");
            return None;
        }

        let page_dir = self.layout.page_dir(&page);
        let dir_exists = self.check(|| self.pal.directory_exists(&page_dir));
        match event.kind {
            FileChangeKind::Created if dir_exists => Some(WatchAction::Load(page)),
            FileChangeKind::Modified
                if dir_exists
                    && self.check(|| self.pal.file_exists(&self.layout.document_path(&page))) =>
            {
                Some(WatchAction::Reload(page))
            }
            FileChangeKind::Deleted if dir_exists => Some(WatchAction::Reload(page)),
            FileChangeKind::Deleted => Some(WatchAction::Unload(page)),
            _ => None,
        }
    }

    fn check(&self, probe: impl FnOnce() -> PageHostResult<bool>) -> bool {
        probe().unwrap_or_else(|e| {
            warn!(error = %e, "failed to inspect page directory");
            false
        })
    }

    fn is_ignored(&self, path: &FilePath) -> bool {
        self.ignore.is_match(path.as_path())
            || path.file_name().is_some_and(|name| self.ignore.is_match(name))
    }

    /// Classify a batch of events in order, collapse consecutive duplicates and apply the result.
    pub fn process_batch(&self, events: &[FileChangeEvent]) -> Vec<WatchAction> {
        let mut actions: Vec<WatchAction> = events.iter().filter_map(|event| self.classify(event)).collect();
        actions.dedup();
        for action in &actions {
            self.apply(action);
        }
        actions
    }

    pub fn apply(&self, action: &WatchAction) {
        info!(?action, "applying page change");
        match action {
            WatchAction::Load(page) => {
                self.loader.load(page);
            }
            WatchAction::Reload(page) => {
                self.unloader.unload(page);
                self.loader.load(page);
            }
            WatchAction::Unload(page) => {
                self.unloader.unload(page);
            }
        }
    }
}

/// Build a GlobSet from the given glob patterns.
fn build_glob_set(globs: &[String]) -> PageHostResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let compiled = Glob::new(glob).map_err(|e| err!("Invalid ignore pattern '{}': {}", glob, e))?;
        builder.add(compiled);
    }
    builder
        .build()
        .map_err(|e| err!("Failed to build ignore patterns: {}", e))
}

/// Handle to a running watcher. Watching stops when the handle is stopped or dropped.
pub struct PageWatcher {
    _watch: WatchHandle,
    stop: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
}

impl PageWatcher {
    /// Watch the pages root and apply changes on a dedicated thread.
    pub fn start(pal: &PalHandle, processor: WatchProcessor, debounce: Duration) -> PageHostResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let watch = pal.watch_directory(
            &FilePath::root(),
            Box::new(move |event| {
                // The consumer is gone during shutdown; nothing left to do with the event.
                let _ = sender.send(event);
            }),
        )?;

        let stop = Arc::new(AtomicBool::new(false));
        let consumer = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("pagehost-watcher".to_string())
                .spawn(move || consume(&receiver, &processor, &stop, debounce))
                .map_err(|e| err!("Failed to spawn watcher thread: {}", e))?
        };
        info!(debounce_ms = debounce.as_millis() as u64, "watching pages root");
        Ok(Self {
            _watch: watch,
            stop,
            consumer: Some(consumer),
        })
    }

    /// Stop watching and wait for the consumer thread to finish its current batch.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(consumer) = self.consumer.take()
            && consumer.join().is_err()
        {
            warn!("watcher thread panicked");
        }
    }
}

impl Drop for PageWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PageWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWatcher")
            .field("stopped", &self.stop.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn consume(receiver: &Receiver<FileChangeEvent>, processor: &WatchProcessor, stop: &AtomicBool, debounce: Duration) {
    while !stop.load(Ordering::SeqCst) {
        let first = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut batch = vec![first];
        let deadline = Instant::now() + debounce;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            match receiver.recv_timeout(remaining) {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        debug!(events = batch.len(), "processing change batch");
        processor.process_batch(&batch);
    }
    debug!("watcher thread stopped");
}
