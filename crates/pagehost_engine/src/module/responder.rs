use tracing::{debug, warn};

use pagehost_base::pal::http::{HttpBody, HttpResponse, HttpStatusCode};
use pagehost_base::pal::{CommandRequest, FilePath};
use pagehost_base::{PageHostResult, PalHandle};

use crate::api::detail_response;
use crate::page::PageName;

use super::handler::ModuleRequest;
use super::manifest::Route;

pub const ENV_PAGE: &str = "PAGEHOST_PAGE";
pub const ENV_METHOD: &str = "PAGEHOST_METHOD";
pub const ENV_PATH: &str = "PAGEHOST_PATH";
pub const ENV_QUERY: &str = "PAGEHOST_QUERY";
pub const ENV_PARAM_PREFIX: &str = "PAGEHOST_PARAM_";

/// How a route produces its response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    /// Fixed, already serialized JSON body.
    Json(String),
    Text(String),
    /// File relative to the page directory, read per request.
    File(FilePath),
    /// Program and arguments run per request inside the page directory.
    Command(Vec<String>),
}

/// Everything a route needs to answer one request.
pub(crate) struct RouteContext<'a> {
    pub pal: &'a PalHandle,
    pub page: &'a PageName,
    pub page_dir: &'a FilePath,
    pub request: &'a ModuleRequest,
    pub params: Vec<(String, String)>,
}

impl Route {
    pub(crate) fn respond(&self, context: &RouteContext<'_>) -> PageHostResult<HttpResponse> {
        match &self.responder {
            Responder::Json(body) => Ok(self.finish("application/json", body.clone())),
            Responder::Text(text) => Ok(self.finish("text/plain; charset=utf-8", text.clone())),
            Responder::File(file) => Ok(self.respond_file(context, file)),
            Responder::Command(argv) => self.respond_command(context, argv),
        }
    }

    fn finish(&self, default_content_type: &str, body: impl Into<HttpBody>) -> HttpResponse {
        let content_type = self.content_type.as_deref().unwrap_or(default_content_type);
        HttpResponse::new(self.status)
            .with_content_type(content_type)
            .with_body(body)
    }

    fn respond_file(&self, context: &RouteContext<'_>, file: &FilePath) -> HttpResponse {
        let path = context.page_dir.join(file.as_relative().as_str());
        match context.pal.read_file(&path) {
            Ok(reader) => self.finish(guess_content_type(file.as_relative().as_str()), HttpBody::from_reader(reader)),
            Err(e) => {
                warn!(page = %context.page, file = %path, error = %e, "handler file not readable");
                detail_response(HttpStatusCode::NOT_FOUND, "Not Found")
            }
        }
    }

    fn respond_command(&self, context: &RouteContext<'_>, argv: &[String]) -> PageHostResult<HttpResponse> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(detail_response(HttpStatusCode::BAD_GATEWAY, "Handler command failed"));
        };
        let request = context.request;
        let mut env = vec![
            (ENV_PAGE.to_string(), context.page.to_string()),
            (ENV_METHOD.to_string(), request.method.to_string()),
            (ENV_PATH.to_string(), request.path.clone()),
            (ENV_QUERY.to_string(), request.query.clone()),
        ];
        for (name, value) in &context.params {
            env.push((format!("{ENV_PARAM_PREFIX}{}", name.to_ascii_uppercase()), value.clone()));
        }
        let command = CommandRequest {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: context.page_dir.clone(),
            env,
            stdin: request.body.clone(),
            timeout: request.command_timeout,
        };

        let output = match context.pal.run_command(&command) {
            Ok(output) => output,
            Err(e) => {
                warn!(page = %context.page, program = %program, error = %e, "handler command could not be started");
                return Ok(detail_response(HttpStatusCode::BAD_GATEWAY, "Handler command failed"));
            }
        };
        if !output.is_success() {
            warn!(
                page = %context.page,
                program = %program,
                exit_code = ?output.exit_code,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "handler command failed"
            );
            return Ok(detail_response(HttpStatusCode::BAD_GATEWAY, "Handler command failed"));
        }
        debug!(page = %context.page, program = %program, bytes = output.stdout.len(), "handler command finished");
        Ok(self.finish("application/json", output.stdout))
    }
}

/// Guess the MIME type based on file extension.
fn guess_content_type(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" | "md" => "text/plain; charset=utf-8",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("data/items.JSON"), "application/json");
        assert_eq!(guess_content_type("logo.svg"), "image/svg+xml");
        assert_eq!(guess_content_type("README"), "application/octet-stream");
        assert_eq!(guess_content_type("notes.txt"), "text/plain; charset=utf-8");
    }
}
