use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::{PageHostError, PageHostResult, bail, err};

use super::FilePath;
use super::http::{HttpServerConfig, HttpServerHandle, HttpService};
use super::real_http;
use super::traits::{
    CommandOutput, CommandRequest, DirectoryEntry, FileChangeCallback, FileChangeEvent,
    FileChangeKind, Pal, ReadSeek, WatchHandle,
};

/* 📖 # Why use std::fs and threads instead of async?

The host is small and synchronous: a watcher thread, a handful of HTTP
worker threads and short file reads. std::fs, notify's own callback
thread and tiny_http cover that without an async runtime.
*/

/// Concrete PAL implementation using the real operating system.
///
/// All file paths are resolved relative to a configured base directory (the pages root).
#[derive(Debug)]
pub struct RealPal {
    base_dir: PathBuf,
}

impl RealPal {
    /// Create a new RealPal with the given base directory.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The directory all paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a FilePath to a filesystem path.
    fn resolve_path(&self, path: &FilePath) -> PathBuf {
        self.base_dir.join(path.as_path())
    }

    fn not_found(resolved: PathBuf, what: &str) -> Box<PageHostError> {
        Box::new(PageHostError::file(
            resolved,
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{what} not found")),
        ))
    }
}

impl Pal for RealPal {
    #[instrument(skip(self), fields(path = %path))]
    fn file_exists(&self, path: &FilePath) -> PageHostResult<bool> {
        let resolved = self.resolve_path(path);
        let exists = resolved.is_file();
        debug!(exists, resolved = %resolved.display(), "checked file existence");
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    fn directory_exists(&self, path: &FilePath) -> PageHostResult<bool> {
        let resolved = self.resolve_path(path);
        let exists = resolved.is_dir();
        debug!(exists, resolved = %resolved.display(), "checked directory existence");
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    fn read_file(&self, path: &FilePath) -> PageHostResult<Box<dyn ReadSeek + 'static>> {
        let resolved = self.resolve_path(path);
        debug!(resolved = %resolved.display(), "opening file for reading");
        let file = fs::File::open(&resolved).map_err(|e| {
            debug!(error = %e, "failed to open file");
            Box::new(PageHostError::file(resolved, e))
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(path = %path))]
    fn list_directory(&self, path: &FilePath) -> PageHostResult<Vec<DirectoryEntry>> {
        let resolved = self.resolve_path(path);
        if !resolved.is_dir() {
            debug!("directory not found");
            return Err(Self::not_found(resolved, "directory"));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&resolved)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            // A dangling symlink or unreadable child only hides that entry.
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(entry = ?e.path(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            entries.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: entry.file_type().is_dir(),
            });
        }
        debug!(count = entries.len(), "listed directory");
        Ok(entries)
    }

    #[instrument(skip(self, callback), fields(directory = %directory))]
    fn watch_directory(
        &self,
        directory: &FilePath,
        callback: FileChangeCallback,
    ) -> PageHostResult<WatchHandle> {
        let resolved = self.resolve_path(directory);
        if !resolved.is_dir() {
            debug!("directory not found");
            return Err(Self::not_found(resolved, "directory"));
        }

        // Some backends report canonical paths, so strip either form.
        let canonical = fs::canonicalize(&resolved).unwrap_or_else(|_| resolved.clone());
        let roots = vec![canonical, resolved.clone()];
        let base = directory.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for change in translate_event(&event, &roots, &base) {
                        callback(change);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })
        .map_err(|e| err!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&resolved, RecursiveMode::Recursive)
            .map_err(|e| err!("Failed to watch {}: {}", resolved.display(), e))?;
        debug!(resolved = %resolved.display(), "directory watch armed");

        Ok(WatchHandle::new(watcher))
    }

    #[instrument(skip(self, request), fields(program = %request.program))]
    fn run_command(&self, request: &CommandRequest) -> PageHostResult<CommandOutput> {
        let working_dir = self.resolve_path(&request.working_dir);
        let mut child = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&working_dir)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                err!(
                    "Failed to start '{}' in {}: {}",
                    request.program,
                    working_dir.display(),
                    e
                )
            })?;

        // Feed stdin and drain both pipes on their own threads so a chatty child cannot block on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = request.stdin.clone();
            std::thread::spawn(move || {
                if let Err(e) = stdin.write_all(&input) {
                    debug!(error = %e, "child closed stdin early");
                }
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = request.timeout.map(|timeout| Instant::now() + timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if deadline.is_some_and(|deadline| Instant::now() >= deadline) => {
                    warn!(program = %request.program, timeout = ?request.timeout, "command timed out, killing it");
                    if let Err(e) = child.kill() {
                        debug!(error = %e, "failed to kill timed out command");
                    }
                    let _ = child.wait();
                    bail!("'{}' timed out after {:?}", request.program, request.timeout.unwrap_or_default());
                }
                Ok(None) => std::thread::sleep(COMMAND_POLL_INTERVAL),
                Err(e) => bail!("Failed to wait for '{}': {}", request.program, e),
            }
        };
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let collect = |reader: Option<JoinHandle<Vec<u8>>>| {
            reader.and_then(|reader| reader.join().ok()).unwrap_or_default()
        };

        debug!(exit_code = ?status.code(), "command finished");
        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> PageHostResult<HttpServerHandle> {
        real_http::start_server(service, config)
    }
}

const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut bytes) {
            debug!(error = %e, "failed to read command output");
        }
        bytes
    })
}

fn change_kind(kind: &EventKind) -> Option<FileChangeKind> {
    match kind {
        EventKind::Create(_) => Some(FileChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileChangeKind::Created),
        EventKind::Modify(_) => Some(FileChangeKind::Modified),
        EventKind::Remove(_) => Some(FileChangeKind::Deleted),
        _ => None,
    }
}

/// Map a notify event to changes relative to the watched directory.
fn translate_event(event: &Event, roots: &[PathBuf], base: &FilePath) -> Vec<FileChangeEvent> {
    let relative = |path: &Path| {
        roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .map(|rel| base.join(FilePath::from(rel).to_string()))
    };

    // A rename reported as one event carries [from, to].
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind
        && let [from, to] = event.paths.as_slice()
    {
        let mut changes = Vec::new();
        if let Some(path) = relative(from) {
            changes.push(FileChangeEvent::new(FileChangeKind::Deleted, path));
        }
        if let Some(path) = relative(to) {
            changes.push(FileChangeEvent::new(FileChangeKind::Created, path));
        }
        return changes;
    }

    let Some(kind) = change_kind(&event.kind) else {
        return vec![];
    };
    event
        .paths
        .iter()
        .filter_map(|path| relative(path))
        .map(|path| FileChangeEvent::new(kind, path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, RealPal) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let pal = RealPal::new(temp_dir.path().to_path_buf());
        (temp_dir, pal)
    }

    #[test]
    fn test_file_and_directory_exists() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("alpha")).unwrap();
        fs::write(temp_dir.path().join("alpha/index.html"), "<h1>alpha</h1>").unwrap();

        assert!(pal.file_exists(&FilePath::from("alpha/index.html")).unwrap());
        assert!(!pal.file_exists(&FilePath::from("alpha")).unwrap());
        assert!(pal.directory_exists(&FilePath::from("alpha")).unwrap());
        assert!(!pal.directory_exists(&FilePath::from("beta")).unwrap());
    }

    #[test]
    fn test_read_file() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("test.txt"), "hello world").unwrap();

        let result = pal.read_file_to_string(&FilePath::from("test.txt")).unwrap();
        assert_eq!(result, "hello world");
    }

    #[test]
    fn test_read_file_not_found() {
        let (_temp_dir, pal) = setup_test_dir();
        assert!(pal.read_file(&FilePath::from("missing.txt")).is_err());
    }

    #[test]
    fn test_list_directory_sorted() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("zeta")).unwrap();
        fs::create_dir(temp_dir.path().join("alpha")).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(temp_dir.path().join("alpha/nested")).unwrap();

        let entries = pal.list_directory(&FilePath::root()).unwrap();
        let names: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_directory))
            .collect();
        assert_eq!(
            names,
            vec![("alpha", true), ("notes.txt", false), ("zeta", true)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_list_directory_skips_dangling_symlink() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("alpha")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), temp_dir.path().join("zz-broken")).unwrap();

        let entries = pal.list_directory(&FilePath::root()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
    }

    #[test]
    fn test_list_directory_not_found() {
        let (_temp_dir, pal) = setup_test_dir();
        assert!(pal.list_directory(&FilePath::from("nonexistent")).is_err());
    }

    #[test]
    fn test_watch_directory_not_found() {
        let (_temp_dir, pal) = setup_test_dir();
        let callback: FileChangeCallback = Box::new(|_event| {});
        let result = pal.watch_directory(&FilePath::from("nonexistent"), callback);
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_directory_reports_new_file() {
        let (temp_dir, pal) = setup_test_dir();
        let (tx, rx) = mpsc::channel();
        let callback: FileChangeCallback = Box::new(move |event| {
            let _ = tx.send(event);
        });
        let _handle = pal.watch_directory(&FilePath::root(), callback).unwrap();

        fs::create_dir(temp_dir.path().join("gamma")).unwrap();

        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("no watch event received");
        assert_eq!(event.path.first_component(), Some("gamma"));
    }

    #[test]
    fn test_translate_event_relative_paths() {
        let root = PathBuf::from("/srv/pages");
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(root.join("beta/backend.toml"))
            .add_path(PathBuf::from("/elsewhere/file"));

        let changes = translate_event(&event, &[root], &FilePath::root());
        assert_eq!(
            changes,
            vec![FileChangeEvent::new(
                FileChangeKind::Modified,
                "beta/backend.toml"
            )]
        );
    }

    #[test]
    fn test_translate_event_kinds() {
        let root = PathBuf::from("/srv/pages");
        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("a"));
        let removed = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(root.join("a"));
        let renamed = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("old"))
            .add_path(root.join("new"));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(root.join("a"));

        let roots = [root];
        let base = FilePath::root();
        assert_eq!(
            translate_event(&created, &roots, &base)[0].kind,
            FileChangeKind::Created
        );
        assert_eq!(
            translate_event(&removed, &roots, &base)[0].kind,
            FileChangeKind::Deleted
        );
        assert_eq!(
            translate_event(&renamed, &roots, &base),
            vec![
                FileChangeEvent::new(FileChangeKind::Deleted, "old"),
                FileChangeEvent::new(FileChangeKind::Created, "new"),
            ]
        );
        assert!(translate_event(&access, &roots, &base).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_pipes_stdin_to_stdout() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("beta")).unwrap();

        let request = CommandRequest {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat; printf \" $PAGEHOST_PAGE\"".to_string()],
            working_dir: FilePath::from("beta"),
            env: vec![("PAGEHOST_PAGE".to_string(), "beta".to_string())],
            stdin: b"payload".to_vec(),
            timeout: None,
        };
        let output = pal.run_command(&request).unwrap();
        assert!(output.is_success());
        assert_eq!(String::from_utf8(output.stdout).unwrap(), "payload beta");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_timeout_kills_child() {
        let (_temp_dir, pal) = setup_test_dir();
        let request = CommandRequest {
            program: "sleep".to_string(),
            args: vec!["5".to_string()],
            working_dir: FilePath::root(),
            env: vec![],
            stdin: vec![],
            timeout: Some(Duration::from_millis(100)),
        };
        let started = Instant::now();
        let error = pal.run_command(&request).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4), "{:?}", started.elapsed());
        assert!(error.to_string().contains("timed out"), "{error}");
    }

    #[test]
    fn test_run_command_missing_program() {
        let (_temp_dir, pal) = setup_test_dir();
        let request = CommandRequest {
            program: "pagehost-no-such-program".to_string(),
            args: vec![],
            working_dir: FilePath::root(),
            env: vec![],
            stdin: vec![],
            timeout: None,
        };
        assert!(pal.run_command(&request).is_err());
    }
}
