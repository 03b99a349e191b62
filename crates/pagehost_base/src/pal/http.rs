/* 📖 # Why does the PAL own the HTTP types?

Both the tiny_http server and MockPal hand requests to the same
`HttpService`. Keeping requests and responses as plain PAL types means the
front door and the handler modules never see tiny_http, and a test can push
a request through the whole host without opening a socket.
*/

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Request methods the host understands. Anything else is rejected by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    const ALL: [(HttpMethod, &'static str); 7] = [
        (HttpMethod::Get, "GET"),
        (HttpMethod::Head, "HEAD"),
        (HttpMethod::Post, "POST"),
        (HttpMethod::Put, "PUT"),
        (HttpMethod::Patch, "PATCH"),
        (HttpMethod::Delete, "DELETE"),
        (HttpMethod::Options, "OPTIONS"),
    ];

    /// Case-insensitive lookup of a method token.
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(token))
            .map(|(method, _)| *method)
    }

    pub fn as_str(&self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(method, _)| method == self)
            .map(|(_, name)| *name)
            .unwrap_or("GET")
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header map keyed case-insensitively; inserting a name again replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: HashMap<String, String>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.entries.insert(name, value.into());
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.entries
            .iter()
            .find_map(|(existing, value)| existing.eq_ignore_ascii_case(name).then_some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

/// Body of a request or response.
///
/// Page documents are streamed from their file handle; everything else the
/// host produces is a small in-memory buffer.
pub enum HttpBody {
    Bytes(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl HttpBody {
    pub fn empty() -> Self {
        Self::Bytes(Vec::new())
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Buffered content as UTF-8, `None` for streams and invalid text.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
            Self::Stream(_) => None,
        }
    }

    /// Length when buffered. Streams have no known length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len()),
            Self::Stream(_) => None,
        }
    }

    /// Read the whole body into memory.
    pub fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Self::Bytes(bytes) => Box::new(std::io::Cursor::new(bytes)),
            Self::Stream(reader) => reader,
        }
    }
}

impl Default for HttpBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Vec<u8>> for HttpBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for HttpBody {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<&str> for HttpBody {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

/// An incoming request. `target` is the raw request target, query included.
#[derive(Debug)]
pub struct HttpRequest {
    method: HttpMethod,
    target: String,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HttpHeaders::new(),
            body: HttpBody::empty(),
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.target
    }

    pub fn path_without_query(&self) -> &str {
        self.split_target().0
    }

    /// Query string without the `?`, empty when there is none.
    pub fn query(&self) -> &str {
        self.split_target().1
    }

    fn split_target(&self) -> (&str, &str) {
        self.target.split_once('?').unwrap_or((&self.target, ""))
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    pub fn into_body(self) -> HttpBody {
        self.body
    }

    pub fn with_body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Response status. Handler modules may answer with any code in 100..=599.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HttpStatusCode(u16);

impl HttpStatusCode {
    pub const OK: Self = Self(200);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const BAD_GATEWAY: Self = Self(502);

    pub fn new(code: u16) -> Option<Self> {
        (100..=599).contains(&code).then_some(Self(code))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        self.0 / 100 == 2
    }
}

impl std::fmt::Display for HttpStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An outgoing response, assembled with the `with_*` builders.
#[derive(Debug)]
pub struct HttpResponse {
    status: HttpStatusCode,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpResponse {
    pub fn new(status: HttpStatusCode) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: HttpBody::empty(),
        }
    }

    pub fn ok() -> Self {
        Self::new(HttpStatusCode::OK)
    }

    pub fn internal_error() -> Self {
        Self::new(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 200 with an already serialized JSON body.
    pub fn json(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type("application/json")
            .with_body(body.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type("text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn status(&self) -> HttpStatusCode {
        self.status
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    pub fn into_body(self) -> HttpBody {
        self.body
    }

    pub fn into_parts(self) -> (HttpStatusCode, HttpHeaders, HttpBody) {
        (self.status, self.headers, self.body)
    }

    pub fn with_status(mut self, status: HttpStatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }
}

pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Listener settings. A `port` of `None` lets the OS pick one.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: Option<u16>,
    /// Sent back in the `Server` header.
    pub server_name: String,
    pub worker_threads: usize,
    /// Larger request bodies are answered with 413 before reaching the service.
    pub max_body_bytes: u64,
}

impl HttpServerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Zero is treated as one worker.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// `host:port` to bind, with port 0 when unset.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(0))
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            server_name: "pagehost".to_string(),
            worker_threads: 4,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/* 📖 # Why one service trait instead of a route table?

Pages come and go while the server runs, so the set of routes is not known
when the listener starts. The server hands every request to a single
`HttpService`, and the engine decides per request whether it hits discovery,
a page document or a page's API prefix.
*/

/// Answers HTTP requests. Shared by all worker threads.
pub trait HttpService: std::fmt::Debug + Send + Sync + 'static {
    /// An `Err` is an internal failure and is answered with a 500.
    fn handle_request(&self, request: HttpRequest) -> crate::PageHostResult<HttpResponse>;
}

/// A running server. Dropping the handle raises the shutdown flag.
#[derive(Debug)]
pub struct HttpServerHandle {
    port: u16,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl HttpServerHandle {
    /// Handle without worker threads, as used by MockPal.
    pub fn new(port: u16) -> Self {
        Self::with_workers(port, Arc::new(AtomicBool::new(false)), Vec::new())
    }

    pub fn with_workers(port: u16, shutdown: Arc<AtomicBool>, workers: Vec<JoinHandle<()>>) -> Self {
        Self {
            port,
            shutdown,
            workers,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Workers poll this flag; setting it from anywhere stops the server.
    pub fn shutdown_flag(&self) -> &Arc<AtomicBool> {
        &self.shutdown
    }

    /// Join all worker threads.
    pub fn wait(mut self) {
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                tracing::error!("HTTP worker thread panicked");
            }
        }
    }
}

impl Drop for HttpServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_tokens() {
        assert_eq!(HttpMethod::parse("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("patch"), Some(HttpMethod::Patch));
        assert_eq!(HttpMethod::parse("BREW"), None);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_headers_replace_regardless_of_case() {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some(&"text/html".to_string()));

        headers.insert("CONTENT-TYPE", "application/json");
        assert_eq!(headers.iter().count(), 1);
        assert_eq!(headers.get("Content-Type"), Some(&"application/json".to_string()));
    }

    #[test]
    fn test_streamed_body_is_drained() {
        let body = HttpBody::from_reader(std::io::Cursor::new(b"<h1>alpha</h1>".to_vec()));
        assert_eq!(body.len(), None);
        assert_eq!(body.as_string(), None);
        assert_eq!(body.into_bytes().unwrap(), b"<h1>alpha</h1>");
    }

    #[test]
    fn test_request_target_split() {
        let request = HttpRequest::new(HttpMethod::Get, "/beta/api/items?limit=5&q=x");
        assert_eq!(request.path_without_query(), "/beta/api/items");
        assert_eq!(request.query(), "limit=5&q=x");

        let plain = HttpRequest::new(HttpMethod::Get, "/alpha");
        assert_eq!(plain.path_without_query(), "/alpha");
        assert_eq!(plain.query(), "");
    }

    #[test]
    fn test_status_code_range() {
        assert_eq!(HttpStatusCode::new(418).map(|s| s.as_u16()), Some(418));
        assert_eq!(HttpStatusCode::new(99), None);
        assert_eq!(HttpStatusCode::new(600), None);
        assert!(HttpStatusCode::OK.is_success());
        assert!(!HttpStatusCode::NOT_FOUND.is_success());
    }

    #[test]
    fn test_response_builders() {
        let json = HttpResponse::json("{\"pages\":[]}");
        assert_eq!(json.status(), HttpStatusCode::OK);
        assert_eq!(json.headers().get("content-type"), Some(&"application/json".to_string()));

        let text = HttpResponse::text("hi").with_status(HttpStatusCode::BAD_GATEWAY);
        assert_eq!(text.status().as_u16(), 502);
        assert_eq!(text.body().as_string(), Some("hi".to_string()));
    }

    #[test]
    fn test_server_config_address() {
        let config = HttpServerConfig::new("0.0.0.0").with_port(8000).with_worker_threads(2);
        assert_eq!(config.address(), "0.0.0.0:8000");
        assert_eq!(config.worker_threads, 2);
        assert_eq!(HttpServerConfig::default().address(), "127.0.0.1:0");
    }

    #[test]
    fn test_dropping_handle_raises_shutdown_flag() {
        let handle = HttpServerHandle::new(8080);
        let flag = Arc::clone(handle.shutdown_flag());
        assert!(!flag.load(Ordering::SeqCst));
        drop(handle);
        assert!(flag.load(Ordering::SeqCst));
    }
}
