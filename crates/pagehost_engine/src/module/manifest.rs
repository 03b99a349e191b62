/* 📖 # Why a declarative handler module?

A page bundle carries its backend next to its document and the host loads it
at runtime, without being rebuilt. Instead of linking native code into the
process, a bundle declares its routes in `backend.toml`: each route answers
with a fixed JSON or text body, a file of the bundle, or the output of a
command run inside the page directory. Loading means parsing and validating
this file into an immutable set of routes. A broken file fails the load of
that one page, never the host.
*/

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use pagehost_base::pal::http::{HttpMethod, HttpStatusCode};
use pagehost_base::FilePath;

use super::ModuleLoadError;
use super::pattern::PathPattern;
use super::responder::Responder;

#[derive(Debug, Deserialize)]
struct ManifestFile {
    router: Option<RouterSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouterSection {
    #[serde(default)]
    routes: Vec<RouteSection>,
}

#[derive(Debug, Deserialize)]
struct RouteSection {
    method: Option<String>,
    path: String,
    status: Option<u16>,
    content_type: Option<String>,
    json: Option<toml::Value>,
    text: Option<String>,
    file: Option<String>,
    command: Option<Vec<String>>,
    #[serde(flatten)]
    unknown: BTreeMap<String, toml::Value>,
}

/// A validated route of a handler module.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub pattern: PathPattern,
    pub status: HttpStatusCode,
    pub content_type: Option<String>,
    pub responder: Responder,
}

/// Parse and validate the text of a handler-module file.
pub(crate) fn parse_manifest(text: &str) -> Result<Vec<Route>, ModuleLoadError> {
    let manifest: ManifestFile =
        toml::from_str(text).map_err(|e| ModuleLoadError::Parse(e.message().to_string()))?;
    let router = manifest.router.ok_or(ModuleLoadError::MissingRouter)?;

    let mut seen = HashSet::new();
    let mut routes = Vec::with_capacity(router.routes.len());
    for (index, section) in router.routes.into_iter().enumerate() {
        let route = validate_route(section)
            .map_err(|message| ModuleLoadError::Invalid(format!("route #{}: {}", index + 1, message)))?;
        if !seen.insert((route.method, route.pattern.as_str().to_string())) {
            return Err(ModuleLoadError::Invalid(format!(
                "route #{}: duplicate route {} {}",
                index + 1,
                route.method,
                route.pattern.as_str()
            )));
        }
        routes.push(route);
    }
    Ok(routes)
}

fn validate_route(section: RouteSection) -> Result<Route, String> {
    if let Some(key) = section.unknown.keys().next() {
        return Err(format!("unknown key '{key}'"));
    }

    let method = match &section.method {
        None => HttpMethod::Get,
        Some(method) => HttpMethod::parse(method)
            .ok_or_else(|| format!("unsupported method '{method}'"))?,
    };
    let pattern = PathPattern::parse(&section.path)?;
    let status = match section.status {
        None => HttpStatusCode::OK,
        Some(code) => HttpStatusCode::new(code).ok_or_else(|| format!("invalid status {code}"))?,
    };

    let mut responders = Vec::new();
    if let Some(value) = section.json {
        let body = serde_json::to_string(&value).map_err(|e| format!("invalid json body: {e}"))?;
        responders.push(Responder::Json(body));
    }
    if let Some(text) = section.text {
        responders.push(Responder::Text(text));
    }
    if let Some(file) = section.file {
        responders.push(Responder::File(validate_file(&file)?));
    }
    if let Some(command) = section.command {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err("command must name a program".to_string());
        }
        responders.push(Responder::Command(command));
    }

    if responders.len() != 1 {
        return Err(format!(
            "expected exactly one of json, text, file or command, found {}",
            responders.len()
        ));
    }
    let responder = responders.remove(0);

    Ok(Route {
        method,
        pattern,
        status,
        content_type: section.content_type,
        responder,
    })
}

fn validate_file(file: &str) -> Result<FilePath, String> {
    let escapes = file.is_empty()
        || file.starts_with(['/', '\\'])
        || std::path::Path::new(file).is_absolute()
        || file.split(['/', '\\']).any(|part| part == "..");
    if escapes {
        return Err(format!("file '{file}' must stay inside the page directory"));
    }
    Ok(FilePath::from(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn invalid(text: &str) -> String {
        match parse_manifest(text) {
            Err(error) => error.to_string(),
            Ok(routes) => panic!("expected an error, got {routes:?}"),
        }
    }

    #[test]
    fn test_minimal_router() {
        let routes = parse_manifest(
            r#"
            [router]

            [[router.routes]]
            path = "/ping"
            json = { ok = true }
            "#,
        )
        .unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].method, HttpMethod::Get);
        assert_eq!(routes[0].status, HttpStatusCode::OK);
        assert!(matches!(&routes[0].responder, Responder::Json(body) if body == r#"{"ok":true}"#));
    }

    #[test]
    fn test_all_responders() {
        let routes = parse_manifest(
            r#"
            [[router.routes]]
            method = "post"
            path = "/echo/{id}"
            command = ["python3", "echo.py"]

            [[router.routes]]
            path = "/readme"
            file = "docs/readme.txt"

            [[router.routes]]
            path = "/hello"
            text = "hi"
            status = 201
            content_type = "text/x-greeting"
            "#,
        )
        .unwrap();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].method, HttpMethod::Post);
        assert!(matches!(&routes[1].responder, Responder::File(path) if path == &FilePath::from("docs/readme.txt")));
        assert_eq!(routes[2].status.as_u16(), 201);
        assert_eq!(routes[2].content_type.as_deref(), Some("text/x-greeting"));
    }

    #[test]
    fn test_router_without_routes() {
        assert!(parse_manifest("[router]").unwrap().is_empty());
    }

    #[test]
    fn test_missing_router() {
        expect!["handler module exposes no router"].assert_eq(&invalid("title = \"beta\""));
    }

    #[test]
    fn test_invalid_routes() {
        expect!["invalid handler module: route #1: expected exactly one of json, text, file or command, found 0"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\""));
        expect!["invalid handler module: route #1: expected exactly one of json, text, file or command, found 2"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\"\ntext = \"a\"\njson = 1"));
        expect!["invalid handler module: route #1: unknown key 'python'"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\"\npython = \"x\""));
        expect!["invalid handler module: route #1: unsupported method 'FETCH'"]
            .assert_eq(&invalid("[[router.routes]]\nmethod = \"FETCH\"\npath = \"/a\"\ntext = \"a\""));
        expect!["invalid handler module: route #1: path 'a' must start with '/'"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"a\"\ntext = \"a\""));
        expect!["invalid handler module: route #1: command must name a program"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\"\ncommand = []"));
        expect!["invalid handler module: route #1: file '../secret' must stay inside the page directory"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\"\nfile = \"../secret\""));
        expect!["invalid handler module: route #2: duplicate route GET /a"]
            .assert_eq(&invalid("[[router.routes]]\npath = \"/a\"\ntext = \"a\"\n[[router.routes]]\npath = \"/a\"\ntext = \"b\""));
    }

    #[test]
    fn test_syntax_error() {
        let message = invalid("[router");
        assert!(message.starts_with("invalid TOML in handler module: "), "{message}");
    }
}
