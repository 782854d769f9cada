//! Configuration manager for twgate.
//!
//! Values come from `config.yaml` first, then from `APP_*` environment
//! variables which always win.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::Deserialize;
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_API_URL: &str = "https://api.twitch.tv";
const DEFAULT_ID_URL: &str = "https://id.twitch.tv";
const DEFAULT_TIMEOUT_MS: u64 = 1000;
const TOKEN_FILE: &str = "token.json";
const CACHE_DIRECTORY: &str = "cache";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that may occur while building the configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing `{0}` environment variable")]
    Missing(&'static str),
    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),
    #[error("`{name}` must be a port number, got {value:?}")]
    Port { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Listening port.
    pub port: u16,
    /// Verbose logging and the `/debug` endpoint.
    pub debug: bool,
    /// Read commands from stdin.
    pub console: bool,
    /// Directory holding the token file.
    pub data_path: PathBuf,
    /// Directory holding cache documents. Defaults to `<data_path>/cache`.
    pub cache_path: Option<PathBuf>,
    pub twitch: Twitch,
    pub cache: Cache,
    #[serde(skip)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
}

/// Upstream platform configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Twitch {
    /// Application client ID, also sent as `Client-Id`.
    pub client_id: String,
    /// Application secret used by the grant flow.
    pub client_secret: String,
    /// Resource API base URL.
    pub api_url: String,
    /// Identity provider base URL.
    pub id_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Cache behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Cache {
    /// Refresh (and save) caches right after their initial load.
    pub refresh_on_start: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            debug: false,
            console: false,
            data_path: PathBuf::from("."),
            cache_path: None,
            twitch: Twitch::default(),
            cache: Cache::default(),
            version: VERSION.to_owned(),
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

impl Default for Twitch {
    fn default() -> Self {
        Self {
            client_id: String::default(),
            client_secret: String::default(),
            api_url: DEFAULT_API_URL.to_owned(),
            id_url: DEFAULT_ID_URL.to_owned(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            refresh_on_start: true,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Path of the persisted access token.
    pub fn token_path(&self) -> PathBuf {
        self.data_path.join(TOKEN_FILE)
    }

    /// Directory of cache documents.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.data_path.join(CACHE_DIRECTORY))
    }

    /// Upstream request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.twitch.timeout_ms)
    }

    /// Reads the `config.yaml` file. A missing or invalid file is logged and
    /// replaced by defaults.
    pub fn read(self) -> Self {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(config) => Self {
                    version: VERSION.to_owned(),
                    path: file_path,
                    ..config
                },
                Err(err) => self.error(err),
            },
            Err(err) => {
                tracing::debug!(error = %err, path = %file_path.display(), "no configuration file");
                self
            },
        }
    }

    /// Override values with `APP_*` variables and validate the result.
    pub fn from_env(self) -> Result<Self, Error> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Same as [`Configuration::from_env`] with a custom variable lookup.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(client_id) = var("APP_CLIENTID") {
            self.twitch.client_id = client_id;
        }
        if let Some(secret) = var("APP_SECRET") {
            self.twitch.client_secret = secret;
        }
        if let Some(path) = var("APP_DATA_PATH") {
            self.data_path = PathBuf::from(path);
        }
        if let Some(path) = var("APP_CACHE_PATH") {
            self.cache_path = Some(PathBuf::from(path));
        }
        if let Some(port) = var("APP_HTTP_PORT") {
            self.port = port.parse().map_err(|_| Error::Port {
                name: "APP_HTTP_PORT",
                value: port,
            })?;
        }
        if let Some(debug) = var("APP_DEBUG") {
            self.debug = debug == "on";
        }
        if let Some(console) = var("APP_CONSOLE") {
            self.console = console == "on";
        }

        if self.twitch.client_id.is_empty() {
            return Err(Error::Missing("APP_CLIENTID"));
        }
        if self.twitch.client_secret.is_empty() {
            return Err(Error::Missing("APP_SECRET"));
        }

        self.twitch.api_url = normalize_url(&self.twitch.api_url)?;
        self.twitch.id_url = normalize_url(&self.twitch.id_url)?;

        Ok(self)
    }

    /// Return a default configuration as fallback.
    fn error(self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = %self.path.display(), "invalid configuration file, using defaults");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

/// Normalizes a URL string by ensuring it starts with a valid scheme
/// (`http` or `https`). The trailing slash is dropped so paths can be
/// appended.
fn normalize_url(url: &str) -> Result<String, url::ParseError> {
    let url_with_scheme = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    let parsed_url = Url::parse(&url_with_scheme)?;
    Ok(parsed_url.as_str().trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::default()
            .apply_env(env(&[("APP_CLIENTID", "id"), ("APP_SECRET", "secret")]))
            .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.twitch.api_url, "https://api.twitch.tv");
        assert_eq!(config.twitch.id_url, "https://id.twitch.tv");
        assert_eq!(config.token_path(), PathBuf::from("./token.json"));
        assert_eq!(config.cache_dir(), PathBuf::from("./cache"));
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert!(config.cache.refresh_on_start);
        assert_eq!(config.version(), VERSION);
    }

    #[test]
    fn test_env_overrides() {
        let config = Configuration::default()
            .apply_env(env(&[
                ("APP_CLIENTID", "id"),
                ("APP_SECRET", "secret"),
                ("APP_DATA_PATH", "/var/lib/twgate"),
                ("APP_HTTP_PORT", "1111"),
                ("APP_DEBUG", "on"),
            ]))
            .unwrap();

        assert_eq!(config.twitch.client_id, "id");
        assert_eq!(config.port, 1111);
        assert!(config.debug);
        assert!(!config.console);
        assert_eq!(config.token_path(), PathBuf::from("/var/lib/twgate/token.json"));
        assert_eq!(config.cache_dir(), PathBuf::from("/var/lib/twgate/cache"));

        let config = config
            .apply_env(env(&[("APP_CACHE_PATH", "/tmp/cache")]))
            .unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_missing_credentials() {
        let err = Configuration::default().apply_env(env(&[])).unwrap_err();
        assert!(matches!(err, Error::Missing("APP_CLIENTID")));

        let err = Configuration::default()
            .apply_env(env(&[("APP_CLIENTID", "id")]))
            .unwrap_err();
        assert!(matches!(err, Error::Missing("APP_SECRET")));
    }

    #[test]
    fn test_invalid_port() {
        let err = Configuration::default()
            .apply_env(env(&[
                ("APP_CLIENTID", "id"),
                ("APP_SECRET", "secret"),
                ("APP_HTTP_PORT", "http"),
            ]))
            .unwrap_err();
        assert!(matches!(err, Error::Port { .. }));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("api.twitch.tv").unwrap(), "https://api.twitch.tv");
        assert_eq!(
            normalize_url("http://127.0.0.1:8000/").unwrap(),
            "http://127.0.0.1:8000"
        );
    }

    #[test]
    fn test_read_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "port: 9000\ntwitch:\n  client_id: from-file\n  timeout_ms: 2500\ncache:\n  refresh_on_start: false\n",
        )
        .unwrap();

        let config = Configuration::default().path(path).read();
        assert_eq!(config.port, 9000);
        assert_eq!(config.twitch.client_id, "from-file");
        assert_eq!(config.twitch.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert!(!config.cache.refresh_on_start);
    }
}
