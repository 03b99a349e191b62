/* 📖 # Why a single front-door service?

All three URL namespaces of the host (discovery, documents, page APIs) share
one path space: `/{page}` and `/{page}/api/...` are only told apart by
their segments, and `__pages__` is reserved so it can never be a page name.
One `HttpService` splits the decoded path into segments and routes on them,
which keeps precedence rules in one match statement.
*/

use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::{debug, warn};

use pagehost_base::pal::http::{HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpService, HttpStatusCode};
use pagehost_base::{PageHostResult, PalHandle, err};

use crate::module::{ModuleRequest, ModuleTable};
use crate::mount::{MountTable, api_prefix};
use crate::page::{BundleLayout, DISCOVERY_SEGMENT, PageEntry, PageName};
use crate::registry::Registry;

use super::{detail_response, json_response};

const API_SEGMENT: &str = "api";

/// API response structure for the discovery endpoint.
#[derive(Serialize)]
struct PagesResponse {
    pages: Vec<PageEntry>,
}

/// Where a request path leads.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    Discovery,
    Document(&'a str),
    Api { page: &'a str, rest: &'a [String] },
    Unknown,
}

fn target(segments: &[String]) -> Target<'_> {
    match segments {
        [first] if first == DISCOVERY_SEGMENT => Target::Discovery,
        [first, trailing] if first == DISCOVERY_SEGMENT && trailing.is_empty() => Target::Discovery,
        [page] if page.is_empty() => Target::Unknown,
        [page] => Target::Document(page),
        [page, trailing] if trailing.is_empty() => Target::Document(page),
        [page, api, rest @ ..] if api == API_SEGMENT => Target::Api { page, rest },
        _ => Target::Unknown,
    }
}

/// Percent-decoded segments of a path, `None` if a segment is not valid UTF-8.
fn decode_segments(path: &str) -> Option<Vec<String>> {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.into_owned())
        })
        .collect()
}

/// HTTP front door of the page host.
#[derive(Debug, Clone)]
pub struct PageService {
    pal: PalHandle,
    layout: BundleLayout,
    registry: Registry,
    modules: ModuleTable,
    mounts: MountTable,
    command_timeout: Option<Duration>,
}

impl PageService {
    pub fn new(
        pal: PalHandle,
        layout: BundleLayout,
        registry: Registry,
        modules: ModuleTable,
        mounts: MountTable,
    ) -> Self {
        Self {
            pal,
            layout,
            registry,
            modules,
            mounts,
            command_timeout: None,
        }
    }

    /// Limit applied to `command` responders of every page.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Handle `GET /__pages__`.
    fn handle_discovery(&self, method: HttpMethod) -> PageHostResult<HttpResponse> {
        if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
            return Ok(method_not_allowed());
        }
        let response = PagesResponse {
            pages: self.registry.snapshot(),
        };
        json_response(HttpStatusCode::OK, &response)
    }

    /// Handle `GET /{page}` by streaming the page document.
    fn handle_document(&self, method: HttpMethod, name: &str) -> PageHostResult<HttpResponse> {
        if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
            return Ok(method_not_allowed());
        }
        let Some(page) = PageName::new(name).filter(|page| self.registry.contains(page.as_str())) else {
            debug!(page = name, "document requested for unknown page");
            return Ok(page_not_found());
        };

        let document = self.layout.document_path(&page);
        let reader = match self.pal.read_file(&document) {
            Ok(reader) => reader,
            Err(e) if e.is_not_found() => {
                debug!(page = %page, document = %document, "document removed before the watcher caught up");
                return Ok(page_not_found());
            }
            Err(e) => {
                warn!(page = %page, document = %document, error = %e, "registered page has no readable document");
                return Ok(page_not_found());
            }
        };
        let response = HttpResponse::ok().with_content_type("text/html; charset=utf-8");
        if method == HttpMethod::Head {
            return Ok(response);
        }
        Ok(response.with_body(HttpBody::from_reader(reader)))
    }

    /// Handle `/{page}/api/{rest}` through the page's mount.
    fn handle_api(&self, request: HttpRequest, name: &str, rest: &[String]) -> PageHostResult<HttpResponse> {
        let Some(page) = PageName::new(name) else {
            return Ok(not_found());
        };
        let prefix = api_prefix(&page);
        let Some(key) = self.mounts.resolve(&prefix) else {
            debug!(prefix = %prefix, "no handler module mounted");
            return Ok(not_found());
        };
        let Some(module) = self.modules.resolve(&key) else {
            debug!(prefix = %prefix, module = %key, "mounted handler module has been retired");
            return Ok(not_found());
        };

        let method = request.method();
        let query = request.query().to_string();
        let body = request
            .into_body()
            .into_bytes()
            .map_err(|e| err!("Failed to read request body: {}", e))?;
        let module_request =
            ModuleRequest::new(method, rest.to_vec(), query, body).with_command_timeout(self.command_timeout);
        module.dispatch(&self.pal, &module_request)
    }
}

impl HttpService for PageService {
    fn handle_request(&self, request: HttpRequest) -> PageHostResult<HttpResponse> {
        let method = request.method();
        let Some(segments) = decode_segments(request.path_without_query()) else {
            return Ok(not_found());
        };
        match target(&segments) {
            Target::Discovery => self.handle_discovery(method),
            Target::Document(name) => self.handle_document(method, name),
            Target::Api { page, rest } => self.handle_api(request, page, rest),
            Target::Unknown => Ok(not_found()),
        }
    }
}

fn not_found() -> HttpResponse {
    detail_response(HttpStatusCode::NOT_FOUND, "Not Found")
}

fn page_not_found() -> HttpResponse {
    detail_response(HttpStatusCode::NOT_FOUND, "Page not found")
}

fn method_not_allowed() -> HttpResponse {
    detail_response(HttpStatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
