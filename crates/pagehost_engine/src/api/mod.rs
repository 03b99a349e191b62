/* 📖 # Why an API module in pagehost_engine?

The api module holds the HTTP front door of the host. `PageService`
implements the `HttpService` trait from pagehost_base, so the same service
runs behind the tiny_http server of RealPal and behind
`MockPal::simulate_request` in tests.

Routes:
- `GET /__pages__` lists the registered pages
- `GET /{page}` serves the page document
- `ANY /{page}/api/{rest}` dispatches to the page's mounted handler module
- everything else is 404
*/

mod service;

use serde::Serialize;

use pagehost_base::pal::http::{HttpResponse, HttpStatusCode};
use pagehost_base::{PageHostResult, err};

pub use service::PageService;

/// Error body of every non-success answer: `{"detail": "..."}`.
#[derive(Serialize)]
struct DetailResponse<'a> {
    detail: &'a str,
}

/// Serialize data to JSON and wrap it in a response with the given status.
pub(crate) fn json_response<T: Serialize>(status: HttpStatusCode, data: &T) -> PageHostResult<HttpResponse> {
    serde_json::to_string(data)
        .map(|json| HttpResponse::json(json).with_status(status))
        .map_err(|e| err!("JSON serialization error: {}", e))
}

/// A `{"detail": ...}` response.
pub(crate) fn detail_response(status: HttpStatusCode, detail: &str) -> HttpResponse {
    let body = serde_json::to_string(&DetailResponse { detail }).unwrap_or_else(|_| "{}".to_string());
    HttpResponse::json(body).with_status(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_detail_response_escapes() {
        let response = detail_response(HttpStatusCode::NOT_FOUND, "Page \"x\" not found");
        assert_eq!(response.status(), HttpStatusCode::NOT_FOUND);
        expect![[r#"{"detail":"Page \"x\" not found"}"#]].assert_eq(&response.body().as_string().unwrap());
    }
}
