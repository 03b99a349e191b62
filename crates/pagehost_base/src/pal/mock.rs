use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{PageHostError, PageHostResult, err};

use super::FilePath;
use super::http::{HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService};
use super::traits::{
    CommandOutput, CommandRequest, DirectoryEntry, FileChangeCallback, FileChangeEvent, Pal,
    ReadSeek, WatchHandle,
};

/* 📖 # Why use HashMap for MockPal storage?

MockPal keeps files, directories, watch callbacks, command results and HTTP
services in memory behind Arc<Mutex<T>>:
1. **Speed**: No filesystem I/O, deterministic and fast for unit tests
2. **Isolation**: No side effects on the real filesystem
3. **Control**: Tests decide when watch events fire and what commands print

Directories are implied by the files below them, but can also be added
explicitly to model empty page directories.
*/

/// In-memory PAL implementation for testing.
///
/// # Examples
///
/// ```
/// use pagehost_base::{pal::MockPal, Pal, FilePath};
///
/// let mock = MockPal::new();
/// mock.add_file("alpha/index.html", "<h1>alpha</h1>");
/// assert!(mock.directory_exists(&FilePath::from("alpha")).unwrap());
/// let content = mock.read_file_to_string(&FilePath::from("alpha/index.html")).unwrap();
/// assert_eq!(content, "<h1>alpha</h1>");
/// ```
#[derive(Debug, Clone)]
pub struct MockPal {
    state: Arc<Mutex<MockState>>,
    watchers: Arc<Mutex<Vec<MockWatcher>>>,
    next_port: Arc<AtomicU16>,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<FilePath, Vec<u8>>,
    directories: BTreeSet<FilePath>,
    command_outputs: HashMap<String, CommandOutput>,
    commands: Vec<CommandRequest>,
    http_servers: HashMap<u16, Arc<dyn HttpService>>,
}

struct MockWatcher {
    directory: FilePath,
    callback: FileChangeCallback,
}

impl std::fmt::Debug for MockWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockWatcher")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

const FIRST_MOCK_PORT: u16 = 10000;

impl MockPal {
    /// Create a new empty MockPal.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            watchers: Arc::default(),
            next_port: Arc::new(AtomicU16::new(FIRST_MOCK_PORT)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panic in another test thread must not cascade into unrelated assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add (or replace) a file.
    pub fn add_file(&self, path: impl Into<FilePath>, content: impl Into<Vec<u8>>) {
        self.state().files.insert(path.into(), content.into());
    }

    /// Remove a file.
    pub fn remove_file(&self, path: impl Into<FilePath>) {
        self.state().files.remove(&path.into());
    }

    /// Add an explicit (possibly empty) directory.
    pub fn add_directory(&self, path: impl Into<FilePath>) {
        self.state().directories.insert(path.into());
    }

    /// Remove a directory and everything below it.
    pub fn remove_directory_all(&self, path: impl Into<FilePath>) {
        let path = path.into();
        let mut state = self.state();
        state.files.retain(|file, _| !file.starts_with(&path));
        state.directories.retain(|dir| !dir.starts_with(&path));
    }

    /// Configure what running `program` prints. Unconfigured programs fail to start.
    pub fn set_command_output(&self, program: impl Into<String>, output: CommandOutput) {
        self.state().command_outputs.insert(program.into(), output);
    }

    /// All commands run so far, in order.
    pub fn commands(&self) -> Vec<CommandRequest> {
        self.state().commands.clone()
    }

    /// Deliver a change event to every watch registered on a directory containing the path.
    pub fn emit_file_change(&self, event: FileChangeEvent) {
        let watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for watcher in watchers
            .iter()
            .filter(|watcher| event.path.starts_with(&watcher.directory))
        {
            (watcher.callback)(event.clone());
        }
    }

    /// Number of active directory watches.
    pub fn watch_count(&self) -> usize {
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Simulate an HTTP request to a running server.
    pub fn simulate_request(&self, port: u16, request: HttpRequest) -> PageHostResult<HttpResponse> {
        let service = self
            .state()
            .http_servers
            .get(&port)
            .cloned()
            .ok_or_else(|| err!("No HTTP server registered on port {}", port))?;
        service.handle_request(request)
    }

    /// Get the number of registered HTTP servers.
    pub fn http_server_count(&self) -> usize {
        self.state().http_servers.len()
    }
}

impl Default for MockPal {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn directory_exists(&self, path: &FilePath) -> bool {
        *path == FilePath::root()
            || self.directories.contains(path)
            || self.directories.iter().any(|dir| dir.starts_with(path))
            || self
                .files
                .keys()
                .any(|file| file != path && file.starts_with(path))
    }
}

impl Pal for MockPal {
    fn file_exists(&self, path: &FilePath) -> PageHostResult<bool> {
        Ok(self.state().files.contains_key(path))
    }

    fn directory_exists(&self, path: &FilePath) -> PageHostResult<bool> {
        Ok(self.state().directory_exists(path))
    }

    fn read_file(&self, path: &FilePath) -> PageHostResult<Box<dyn ReadSeek + 'static>> {
        let content = self.state().files.get(path).cloned().ok_or_else(|| {
            Box::new(PageHostError::file(
                path.as_path(),
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ),
            ))
        })?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn list_directory(&self, path: &FilePath) -> PageHostResult<Vec<DirectoryEntry>> {
        let state = self.state();
        if !state.directory_exists(path) {
            return Err(Box::new(PageHostError::file(
                path.as_path(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "directory not found"),
            )));
        }

        let child_of = |candidate: &FilePath| -> Option<String> {
            if candidate == path || !candidate.starts_with(path) {
                return None;
            }
            let rest = candidate.as_relative().strip_prefix(path.as_relative()).ok()?;
            rest.iter().next().map(str::to_string)
        };

        let mut entries = BTreeSet::new();
        for file in state.files.keys() {
            if let Some(name) = child_of(file) {
                let is_directory = state.directory_exists(&path.join(&name));
                entries.insert(DirectoryEntry { name, is_directory });
            }
        }
        for dir in &state.directories {
            if let Some(name) = child_of(dir) {
                entries.insert(DirectoryEntry {
                    name,
                    is_directory: true,
                });
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn watch_directory(
        &self,
        directory: &FilePath,
        callback: FileChangeCallback,
    ) -> PageHostResult<WatchHandle> {
        if !self.state().directory_exists(directory) {
            return Err(err!("Cannot watch missing directory {}", directory));
        }
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(MockWatcher {
                directory: directory.clone(),
                callback,
            });
        Ok(WatchHandle::new(()))
    }

    fn run_command(&self, request: &CommandRequest) -> PageHostResult<CommandOutput> {
        let mut state = self.state();
        state.commands.push(request.clone());
        state
            .command_outputs
            .get(&request.program)
            .cloned()
            .ok_or_else(|| err!("Failed to start '{}': not configured in MockPal", request.program))
    }

    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> PageHostResult<HttpServerHandle> {
        let port = match config.port {
            Some(p) => p,
            None => self.next_port.fetch_add(1, Ordering::SeqCst),
        };
        self.state().http_servers.insert(port, Arc::from(service));
        Ok(HttpServerHandle::new(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pal::FileChangeKind;
    use crate::pal::http::HttpMethod;

    #[test]
    fn test_file_exists() {
        let pal = MockPal::new();
        pal.add_file("alpha/index.html", "content");

        assert!(pal.file_exists(&FilePath::from("alpha/index.html")).unwrap());
        assert!(!pal.file_exists(&FilePath::from("alpha/backend.toml")).unwrap());
    }

    #[test]
    fn test_directory_implied_by_files() {
        let pal = MockPal::new();
        pal.add_file("alpha/index.html", "content");
        pal.add_directory("empty");

        assert!(pal.directory_exists(&FilePath::from("alpha")).unwrap());
        assert!(pal.directory_exists(&FilePath::from("empty")).unwrap());
        assert!(!pal.directory_exists(&FilePath::from("alpha/index.html")).unwrap());
        assert!(!pal.directory_exists(&FilePath::from("beta")).unwrap());
    }

    #[test]
    fn test_read_file_not_found() {
        let pal = MockPal::new();
        assert!(pal.read_file(&FilePath::from("missing.txt")).is_err());
    }

    #[test]
    fn test_list_directory() {
        let pal = MockPal::new();
        pal.add_file("beta/index.html", "");
        pal.add_file("beta/backend.toml", "");
        pal.add_file("alpha/index.html", "");
        pal.add_file("readme.txt", "");
        pal.add_directory("empty");

        let entries = pal.list_directory(&FilePath::root()).unwrap();
        let names: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_directory))
            .collect();
        assert_eq!(
            names,
            vec![
                ("alpha", true),
                ("beta", true),
                ("empty", true),
                ("readme.txt", false)
            ]
        );

        let beta: Vec<String> = pal
            .list_directory(&FilePath::from("beta"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(beta, vec!["backend.toml", "index.html"]);
    }

    #[test]
    fn test_remove_directory_all() {
        let pal = MockPal::new();
        pal.add_file("alpha/index.html", "");
        pal.add_file("alphabet/index.html", "");
        pal.remove_directory_all("alpha");

        assert!(!pal.directory_exists(&FilePath::from("alpha")).unwrap());
        assert!(pal.directory_exists(&FilePath::from("alphabet")).unwrap());
    }

    #[test]
    fn test_emit_file_change_reaches_matching_watchers() {
        let pal = MockPal::new();
        pal.add_directory("pages");
        let (tx, rx) = std::sync::mpsc::channel();
        let _handle = pal
            .watch_directory(
                &FilePath::from("pages"),
                Box::new(move |event| {
                    let _ = tx.send(event);
                }),
            )
            .unwrap();
        assert_eq!(pal.watch_count(), 1);

        pal.emit_file_change(FileChangeEvent::new(FileChangeKind::Created, "elsewhere/x"));
        pal.emit_file_change(FileChangeEvent::new(FileChangeKind::Created, "pages/alpha"));

        let received: Vec<FileChangeEvent> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![FileChangeEvent::new(FileChangeKind::Created, "pages/alpha")]
        );
    }

    #[test]
    fn test_run_command_records_requests() {
        let pal = MockPal::new();
        pal.set_command_output("python3", CommandOutput::success("{}"));
        let request = CommandRequest {
            program: "python3".to_string(),
            args: vec!["handler.py".to_string()],
            working_dir: FilePath::from("beta"),
            env: vec![],
            stdin: vec![],
            timeout: None,
        };

        let output = pal.run_command(&request).unwrap();
        assert_eq!(output.stdout, b"{}");
        assert_eq!(pal.commands(), vec![request]);

        let unknown = CommandRequest {
            program: "ruby".to_string(),
            ..pal.commands()[0].clone()
        };
        assert!(pal.run_command(&unknown).is_err());
    }

    #[test]
    fn test_simulate_request() {
        #[derive(Debug)]
        struct PingService;
        impl HttpService for PingService {
            fn handle_request(&self, _request: HttpRequest) -> PageHostResult<HttpResponse> {
                Ok(HttpResponse::text("pong"))
            }
        }

        let pal = MockPal::new();
        let handle = pal
            .start_http_server(Box::new(PingService), HttpServerConfig::default())
            .unwrap();
        assert_eq!(handle.port(), FIRST_MOCK_PORT);
        assert_eq!(pal.http_server_count(), 1);

        let response = pal
            .simulate_request(handle.port(), HttpRequest::new(HttpMethod::Get, "/ping"))
            .unwrap();
        assert_eq!(response.body().as_string(), Some("pong".to_string()));
        assert!(
            pal.simulate_request(1, HttpRequest::new(HttpMethod::Get, "/"))
                .is_err()
        );
    }
}
