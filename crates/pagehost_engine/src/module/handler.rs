use std::time::Duration;

use tracing::debug;

use pagehost_base::pal::http::{HttpMethod, HttpResponse, HttpStatusCode};
use pagehost_base::{FilePath, PageHostResult, PalHandle};

use crate::api::detail_response;
use crate::page::PageName;

use super::key::ModuleKey;
use super::manifest::{Route, parse_manifest};
use super::responder::RouteContext;
use super::ModuleLoadError;

/// A request as seen by a handler module, relative to its `/<page>/api` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub method: HttpMethod,
    /// Percent-decoded segments of the sub-path below the mount. Routes match on these,
    /// so a decoded `/` stays inside its segment.
    pub segments: Vec<String>,
    /// The segments joined back with `/`, always starting with `/`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub body: Vec<u8>,
    /// Limit for `command` responders, `None` to wait indefinitely.
    pub command_timeout: Option<Duration>,
}

impl ModuleRequest {
    /// A trailing empty segment (from a trailing slash) is dropped.
    pub fn new(method: HttpMethod, mut segments: Vec<String>, query: impl Into<String>, body: Vec<u8>) -> Self {
        if segments.last().is_some_and(String::is_empty) {
            segments.pop();
        }
        Self {
            method,
            path: format!("/{}", segments.join("/")),
            segments,
            query: query.into(),
            body,
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// One loaded generation of a page's handler module. Immutable once loaded.
#[derive(Debug)]
pub struct HandlerModule {
    key: ModuleKey,
    page_dir: FilePath,
    routes: Vec<Route>,
}

impl HandlerModule {
    /// Read and validate the handler-module file of a page.
    pub fn load(
        pal: &PalHandle,
        key: ModuleKey,
        page_dir: FilePath,
        module_file: &FilePath,
    ) -> Result<Self, ModuleLoadError> {
        let text = pal
            .read_file_to_string(module_file)
            .map_err(ModuleLoadError::Read)?;
        let routes = parse_manifest(&text)?;
        debug!(module = %key, routes = routes.len(), "handler module loaded");
        Ok(Self {
            key,
            page_dir,
            routes,
        })
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn page(&self) -> &PageName {
        self.key.page()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Answer a request with the first route matching both path and method.
    pub fn dispatch(&self, pal: &PalHandle, request: &ModuleRequest) -> PageHostResult<HttpResponse> {
        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = route.pattern.matches(&request.segments) else {
                continue;
            };
            if route.method != request.method {
                path_matched = true;
                continue;
            }
            let context = RouteContext {
                pal,
                page: self.page(),
                page_dir: &self.page_dir,
                request,
                params,
            };
            return route.respond(&context);
        }

        if path_matched {
            Ok(detail_response(HttpStatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
        } else {
            Ok(detail_response(HttpStatusCode::NOT_FOUND, "Not Found"))
        }
    }
}
