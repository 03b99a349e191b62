/* 📖 # Why a pool of tiny_http workers?

tiny_http's Server can be shared between threads, each calling recv on it.
A fixed number of workers gives concurrent request handling without an
async runtime, and polling with a timeout lets every worker notice the
shutdown flag.
*/

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};

use crate::{PageHostResult, err};

use super::http::{
    HttpMethod, HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService, HttpStatusCode,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const INTERNAL_ERROR_BODY: &str = r#"{"detail":"Internal Server Error"}"#;
const METHOD_NOT_ALLOWED_BODY: &str = r#"{"detail":"Method Not Allowed"}"#;
const PAYLOAD_TOO_LARGE_BODY: &str = r#"{"detail":"Payload Too Large"}"#;

pub(crate) fn start_server(
    service: Box<dyn HttpService>,
    config: HttpServerConfig,
) -> PageHostResult<HttpServerHandle> {
    let address = config.address();
    let server = Server::http(&address)
        .map_err(|e| err!("Failed to bind HTTP server to {}: {}", address, e))?;
    let port = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.port())
        .unwrap_or_default();

    let server = Arc::new(server);
    let service: Arc<dyn HttpService> = Arc::from(service);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::new();
    for index in 0..config.worker_threads.max(1) {
        let server = Arc::clone(&server);
        let service = Arc::clone(&service);
        let shutdown = Arc::clone(&shutdown);
        let config = config.clone();
        let worker = thread::Builder::new()
            .name(format!("pagehost-http-{index}"))
            .spawn(move || worker_loop(&server, service.as_ref(), &shutdown, &config))
            .map_err(|e| err!("Failed to spawn HTTP worker: {}", e))?;
        workers.push(worker);
    }

    info!(host = %config.host, port, workers = workers.len(), "HTTP server listening");
    Ok(HttpServerHandle::with_workers(port, shutdown, workers))
}

fn worker_loop(server: &Server, service: &dyn HttpService, shutdown: &AtomicBool, config: &HttpServerConfig) {
    while !shutdown.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle_request(service, request, config),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "HTTP server stopped receiving requests");
                break;
            }
        }
    }
    debug!("HTTP worker stopped");
}

fn handle_request(service: &dyn HttpService, mut request: Request, config: &HttpServerConfig) {
    let server_name = config.server_name.as_str();
    let Some(method) = HttpMethod::parse(request.method().as_str()) else {
        let response = HttpResponse::json(METHOD_NOT_ALLOWED_BODY).with_status(HttpStatusCode::METHOD_NOT_ALLOWED);
        respond(request, response, server_name);
        return;
    };

    let limit = config.max_body_bytes;
    let declared_too_large = request.body_length().is_some_and(|length| length as u64 > limit);
    let mut body = Vec::new();
    if !declared_too_large
        && let Err(e) = request.as_reader().take(limit + 1).read_to_end(&mut body)
    {
        warn!(error = %e, url = request.url(), "failed to read request body");
        return;
    }
    if declared_too_large || body.len() as u64 > limit {
        warn!(url = request.url(), limit, "request body too large");
        let response = HttpResponse::json(PAYLOAD_TOO_LARGE_BODY).with_status(HttpStatusCode::PAYLOAD_TOO_LARGE);
        respond(request, response, server_name);
        return;
    }

    let mut http_request = HttpRequest::new(method, request.url()).with_body(body);
    for header in request.headers() {
        http_request = http_request.with_header(header.field.as_str().as_str(), header.value.as_str());
    }

    let url = request.url().to_string();
    let response = match service.handle_request(http_request) {
        Ok(response) => response,
        Err(e) => {
            error!(%method, url = %url, error = ?e, "request handling failed");
            HttpResponse::internal_error()
                .with_content_type("application/json")
                .with_body(INTERNAL_ERROR_BODY)
        }
    };
    debug!(%method, url = %url, status = %response.status(), "request handled");
    respond(request, response, server_name);
}

fn respond(request: Request, response: HttpResponse, server_name: &str) {
    let (status, headers, body) = response.into_parts();
    let length = body.len();

    let mut tiny_headers = Vec::new();
    if let Ok(header) = Header::from_bytes("Server", server_name.as_bytes()) {
        tiny_headers.push(header);
    }
    for (key, value) in headers.iter() {
        match Header::from_bytes(key.as_bytes(), value.as_bytes()) {
            Ok(header) => tiny_headers.push(header),
            Err(()) => warn!(header = %key, "dropping invalid response header"),
        }
    }

    let response = Response::new(
        StatusCode(status.as_u16()),
        tiny_headers,
        body.into_reader(),
        length,
        None,
    );
    if let Err(e) = request.respond(response) {
        debug!(error = %e, "client went away before the response was sent");
    }
}
