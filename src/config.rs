//! Client and runtime configuration.
//!
//! [`ClientConfig`] is what the library needs. [`Config`] is the binary's view,
//! read from the environment (optionally seeded from a `.env` file).

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fmt, fs};

use crate::engine::{DEFAULT_API_URL, DEFAULT_LONGPOLL_TIMEOUT_SECS, DEFAULT_TIMEOUT, RetryPolicy};
use crate::session::Credentials;

pub const DEFAULT_WATCH_SECS: u64 = 60;

pub struct ClientConfig {
    pub credentials: Credentials,
    /// Mower to talk to. When unset the first mower of the account is adopted at login.
    pub serial: Option<String>,
    /// Default target for [`download_map`](crate::client::IndegoClient::download_map).
    pub map_filename: Option<PathBuf>,
    pub api_url: String,
    /// Raise unexpected status codes and transport errors instead of logging them.
    pub raise_request_exceptions: bool,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(credentials: Credentials) -> Self {
        ClientConfig {
            credentials,
            serial: None,
            map_filename: None,
            api_url: DEFAULT_API_URL.to_string(),
            raise_request_exceptions: false,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_map_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.map_filename = Some(path.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn raise_request_exceptions(mut self, raise: bool) -> Self {
        self.raise_request_exceptions = raise;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout for every request except long-polls, which size their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("credentials", &self.credentials)
            .field("serial", &self.serial)
            .field("map_filename", &self.map_filename)
            .field("api_url", &self.api_url)
            .field("raise_request_exceptions", &self.raise_request_exceptions)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runtime configuration for the `indego` binary.
#[derive(Debug)]
pub struct Config {
    pub client: ClientConfig,
    /// Hold time for each long-poll in watch mode.
    pub longpoll_timeout: u64,
    /// Pause between watch iterations.
    pub watch_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok(), Path::new("token.txt"))
    }

    /// `lookup` stands in for the process environment; `token_file` is the fallback token source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, token_file: &Path) -> Result<Self, String> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Username/password first; otherwise a token from env or token.txt in working directory
        let credentials = match (var("INDEGO_USERNAME"), var("INDEGO_PASSWORD")) {
            (Some(username), Some(password)) => Credentials::basic(username, password),
            (Some(_), None) => return Err("INDEGO_USERNAME is set but INDEGO_PASSWORD is missing".to_string()),
            _ => match var("INDEGO_TOKEN") {
                Some(token) => Credentials::token(token),
                None => match fs::read_to_string(token_file) {
                    Ok(s) if !s.trim().is_empty() => Credentials::token(s.trim()),
                    _ => {
                        return Err(format!(
                            "Missing credentials: set INDEGO_USERNAME and INDEGO_PASSWORD, INDEGO_TOKEN, or provide {}",
                            token_file.display()
                        ));
                    }
                },
            },
        };

        let mut client = ClientConfig::new(credentials);
        client.serial = var("INDEGO_SERIAL");
        client.map_filename = var("INDEGO_MAP_FILE").map(PathBuf::from);
        if let Some(url) = var("INDEGO_API_URL") {
            client.api_url = url;
        }
        client.raise_request_exceptions = var("INDEGO_RAISE_REQUEST_EXCEPTIONS")
            .map(|s| matches!(s.as_str(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false);

        let longpoll_timeout = match var("INDEGO_LONGPOLL_TIMEOUT") {
            Some(s) => s
                .parse::<u64>()
                .map_err(|_| "INDEGO_LONGPOLL_TIMEOUT must be a number of seconds".to_string())?,
            None => DEFAULT_LONGPOLL_TIMEOUT_SECS,
        };

        let watch_secs = var("INDEGO_WATCH_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_WATCH_SECS);

        Ok(Config {
            client,
            longpoll_timeout,
            watch_interval: Duration::from_secs(watch_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn basic_credentials_and_defaults() {
        let cfg = Config::from_lookup(
            env(&[("INDEGO_USERNAME", "me"), ("INDEGO_PASSWORD", "pw"), ("INDEGO_SERIAL", " 123 ")]),
            Path::new("/nonexistent/token.txt"),
        )
        .unwrap();
        assert!(matches!(cfg.client.credentials, Credentials::Basic { ref username, .. } if username == "me"));
        assert_eq!(cfg.client.serial.as_deref(), Some("123"));
        assert_eq!(cfg.client.api_url, DEFAULT_API_URL);
        assert!(!cfg.client.raise_request_exceptions);
        assert_eq!(cfg.longpoll_timeout, DEFAULT_LONGPOLL_TIMEOUT_SECS);
        assert_eq!(cfg.watch_interval, Duration::from_secs(DEFAULT_WATCH_SECS));
    }

    #[test]
    fn token_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.txt");
        std::fs::write(&path, "tok-123\n").unwrap();
        let cfg = Config::from_lookup(env(&[("INDEGO_RAISE_REQUEST_EXCEPTIONS", "1")]), &path).unwrap();
        assert!(matches!(cfg.client.credentials, Credentials::Token { .. }));
        assert!(cfg.client.raise_request_exceptions);
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let err = Config::from_lookup(env(&[]), Path::new("/nonexistent/token.txt")).unwrap_err();
        assert!(err.contains("Missing credentials"));
        assert!(Config::from_lookup(env(&[("INDEGO_USERNAME", "me")]), Path::new("/nonexistent")).is_err());
    }

    #[test]
    fn bad_longpoll_timeout_is_rejected() {
        let result = Config::from_lookup(
            env(&[("INDEGO_TOKEN", "t"), ("INDEGO_LONGPOLL_TIMEOUT", "soon")]),
            Path::new("/nonexistent"),
        );
        assert!(result.is_err());
    }
}
