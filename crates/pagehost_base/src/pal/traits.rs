use std::any::Any;
use std::io::{Read, Seek};
use std::sync::Arc;
use std::time::Duration;

use crate::PageHostResult;

use super::file_path::FilePath;
use super::http::{HttpServerConfig, HttpServerHandle, HttpService};

/// An open file. `Send` so a server worker can stream it as a response body.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One change below a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    /// Path relative to the PAL base directory.
    pub path: FilePath,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeKind, path: impl Into<FilePath>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

pub type FileChangeCallback = Box<dyn Fn(FileChangeEvent) + Send + Sync>;

/// Keeps a directory watch alive. Watching stops when the handle is dropped.
pub struct WatchHandle {
    _guard: Box<dyn Any + Send>,
}

impl WatchHandle {
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_directory: bool,
}

/// An external program to run on behalf of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory relative to the PAL base directory.
    pub working_dir: FilePath,
    pub env: Vec<(String, String)>,
    pub stdin: Vec<u8>,
    /// The process is killed and the run fails once this elapses.
    pub timeout: Option<Duration>,
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: vec![],
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/* 📖 # The host's view of the outside world

Reading page bundles, watching the pages root, running handler commands
and listening for HTTP all go through `Pal`. `RealPal` maps these onto the
filesystem, notify, std::process and tiny_http. `MockPal` keeps files and
servers in memory and lets tests emit change events by hand.
*/

/// Platform abstraction used by every engine component. All paths are relative to the base directory.
pub trait Pal: std::fmt::Debug + Send + Sync + 'static {
    /// True only for regular files.
    fn file_exists(&self, path: &FilePath) -> PageHostResult<bool>;

    fn directory_exists(&self, path: &FilePath) -> PageHostResult<bool>;

    fn read_file(&self, path: &FilePath) -> PageHostResult<Box<dyn ReadSeek + 'static>>;

    /// Whole file as text. Fails on invalid UTF-8.
    fn read_file_to_string(&self, path: &FilePath) -> PageHostResult<String> {
        let mut reader = self.read_file(path)?;
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| Box::new(crate::PageHostError::file(path.as_path(), e)))?;
        String::from_utf8(contents).map_err(|_e| crate::err!("File is not valid UTF-8: {}", path))
    }

    /// Direct children, sorted by name.
    fn list_directory(&self, path: &FilePath) -> PageHostResult<Vec<DirectoryEntry>>;

    /// Report every change below `directory` to `callback`, from a background
    /// thread, until the returned handle is dropped.
    fn watch_directory(
        &self,
        directory: &FilePath,
        callback: FileChangeCallback,
    ) -> PageHostResult<WatchHandle>;

    /// Run to completion with `stdin` fed in, capturing stdout and stderr.
    fn run_command(&self, request: &CommandRequest) -> PageHostResult<CommandOutput>;

    /// Bind and start serving before returning. Serving stops once the handle
    /// is shut down or dropped.
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> PageHostResult<HttpServerHandle>;
}

/// Shared `Pal`, cloned into every component that touches the outside world.
///
/// ```no_run
/// use pagehost_base::{PalHandle, RealPal};
///
/// let pal = PalHandle::new(RealPal::new("pages".into()));
/// let for_watcher = pal.clone();
/// ```
#[derive(Debug, Clone)]
pub struct PalHandle(Arc<dyn Pal>);

impl PalHandle {
    pub fn new(pal: impl Pal + 'static) -> Self {
        Self(Arc::new(pal))
    }
}

impl std::ops::Deref for PalHandle {
    type Target = dyn Pal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_change_event_creation() {
        let event = FileChangeEvent::new(FileChangeKind::Modified, "alpha/index.html");
        assert_eq!(event.kind, FileChangeKind::Modified);
        assert_eq!(event.path, FilePath::from("alpha/index.html"));
    }

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput::success("ok");
        assert!(output.is_success());
        assert!(!CommandOutput::default().is_success());
    }

    #[test]
    fn test_read_file_to_string_rejects_binary() {
        let mock = crate::pal::mock::MockPal::new();
        mock.add_file("alpha/logo.png", vec![0xff, 0xfe, 0x00]);
        let pal = PalHandle::new(mock);
        let error = pal.read_file_to_string(&FilePath::from("alpha/logo.png")).unwrap_err();
        assert_eq!(error.to_string(), "File is not valid UTF-8: alpha/logo.png");
    }
}
