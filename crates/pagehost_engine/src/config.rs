/* 📖 # Why is every config key optional?

A page host should run with zero setup: drop page directories into `pages/`
and start the binary. Every key in `pagehost.toml` therefore has a default,
and the file itself may be missing. Deployment environments usually only
need to move the pages root or the listener, which is what the
`PAGEHOST_*` environment overrides cover.
*/

use std::time::Duration;

use serde::Deserialize;

use pagehost_base::pal::http::{DEFAULT_MAX_BODY_BYTES, HttpServerConfig};
use pagehost_base::{FilePath, PageHostResult, PalHandle, ResultExt, err};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "pagehost.toml";

pub const ENV_PAGES_ROOT: &str = "PAGEHOST_PAGES_ROOT";
pub const ENV_HOST: &str = "PAGEHOST_HOST";
pub const ENV_PORT: &str = "PAGEHOST_PORT";

/// Configuration of a page host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing one sub-directory per page.
    pub pages_root: String,
    /// Address the HTTP server binds to.
    pub host: String,
    pub port: u16,
    /// Document file every page must contain.
    pub document_file: String,
    /// Optional handler-module file of a page.
    pub backend_file: String,
    /// Glob patterns of changed files the watcher ignores.
    pub ignore: Vec<String>,
    /// Window in which watcher events are batched.
    pub debounce_ms: u64,
    pub worker_threads: usize,
    /// Handler commands running longer are killed and answered with 502. Zero disables the limit.
    pub command_timeout_ms: u64,
    /// Request bodies above this size are answered with 413.
    pub max_body_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pages_root: "pages".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            document_file: "index.html".to_string(),
            backend_file: "backend.toml".to_string(),
            ignore: vec!["*.swp".to_string(), "*~".to_string(), "*.tmp".to_string()],
            debounce_ms: 100,
            worker_threads: 4,
            command_timeout_ms: 10_000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_ms > 0).then(|| Duration::from_millis(self.command_timeout_ms))
    }

    /// HTTP server settings derived from this config.
    pub fn server_config(&self) -> HttpServerConfig {
        HttpServerConfig::new(self.host.clone())
            .with_port(self.port)
            .with_worker_threads(self.worker_threads)
            .with_max_body_bytes(self.max_body_bytes)
    }

    /// Apply `PAGEHOST_*` overrides. `lookup` is usually `std::env::var(..).ok()`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> PageHostResult<Self> {
        if let Some(pages_root) = lookup(ENV_PAGES_ROOT) {
            self.pages_root = pages_root;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| err!("Invalid {} '{}': {}", ENV_PORT, port, e))?;
        }
        Ok(self)
    }
}

/// Parse a config from TOML text.
pub fn parse_config(text: &str) -> PageHostResult<Config> {
    toml::from_str(text).map_err(|e| err!("Failed to parse config: {}", e))
}

/// Load a config file through the PAL.
///
/// A missing file yields the defaults unless `required` is set.
pub fn load_config(pal: &PalHandle, path: &FilePath, required: bool) -> PageHostResult<Config> {
    if !pal.file_exists(path)? {
        if required {
            return Err(err!("Config file not found: {}", path));
        }
        return Ok(Config::default());
    }
    let text = pal
        .read_file_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    parse_config(&text).with_context(|| format!("Invalid config file {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use pagehost_base::MockPal;

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());
        expect![[r#"
            Config {
                pages_root: "pages",
                host: "0.0.0.0",
                port: 8000,
                document_file: "index.html",
                backend_file: "backend.toml",
                ignore: [
                    "*.swp",
                    "*~",
                    "*.tmp",
                ],
                debounce_ms: 100,
                worker_threads: 4,
                command_timeout_ms: 10000,
                max_body_bytes: 1048576,
            }
        "#]]
        .assert_debug_eq(&config);
    }

    #[test]
    fn test_partial_config() {
        let config = parse_config(
            r#"
            pages_root = "/srv/pages"
            port = 9000
            ignore = []
            "#,
        )
        .unwrap();
        assert_eq!(config.pages_root, "/srv/pages");
        assert_eq!(config.port, 9000);
        assert!(config.ignore.is_empty());
        assert_eq!(config.document_file, "index.html");
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_limits() {
        let config = parse_config("command_timeout_ms = 0\nmax_body_bytes = 512\n").unwrap();
        assert_eq!(config.command_timeout(), None);
        assert_eq!(config.server_config().max_body_bytes, 512);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let error = parse_config("pages_dir = \"x\"").unwrap_err();
        assert!(error.to_string().contains("unknown field `pages_dir`"), "{error}");
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default()
            .with_overrides(|key| match key {
                ENV_PAGES_ROOT => Some("/tmp/pages".to_string()),
                ENV_PORT => Some("8080".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pages_root, "/tmp/pages");
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.server_config().address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_port_override() {
        let error = Config::default()
            .with_overrides(|key| (key == ENV_PORT).then(|| "eighty".to_string()))
            .unwrap_err();
        expect!["Invalid PAGEHOST_PORT 'eighty': invalid digit found in string"]
            .assert_eq(&error.to_string());
    }

    #[test]
    fn test_load_config_through_pal() {
        let mock = MockPal::new();
        let pal = PalHandle::new(mock.clone());
        let path = FilePath::from(DEFAULT_CONFIG_FILE);

        assert_eq!(load_config(&pal, &path, false).unwrap(), Config::default());
        assert!(load_config(&pal, &path, true).is_err());

        mock.add_file(DEFAULT_CONFIG_FILE, "debounce_ms = 250\n");
        let config = load_config(&pal, &path, true).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(250));

        mock.add_file(DEFAULT_CONFIG_FILE, "debounce_ms = \"soon\"\n");
        let error = load_config(&pal, &path, false).unwrap_err();
        assert!(error.to_string().starts_with("Invalid config file pagehost.toml: "), "{error}");
    }
}
