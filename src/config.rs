//! Server configuration: defaults, then an optional `salesboard.toml`, then
//! `SALESBOARD_*` environment variables, then command-line flags.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::session::ViewLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("unknown argument {0}")]
    UnknownArgument(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dataset every new session starts with
    #[serde(default = "default_data")]
    pub data: PathBuf,
    /// Rows of the resolved data shown in "View Data"
    #[serde(default = "default_view_rows")]
    pub view_rows: usize,
    /// Rows of the date-filtered data in the summary sample table
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// Largest request body accepted, in bytes
    #[serde(default = "default_upload_limit")]
    pub upload_limit: usize,
    /// Idle time after which a session is dropped
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data() -> PathBuf {
    PathBuf::from("Superstore.xls")
}

fn default_view_rows() -> usize {
    ViewLimits::default().view_rows
}

fn default_sample_rows() -> usize {
    ViewLimits::default().sample_rows
}

fn default_upload_limit() -> usize {
    200 * 1024 * 1024 // 200 MB
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            data: default_data(),
            view_rows: default_view_rows(),
            sample_rows: default_sample_rows(),
            upload_limit: default_upload_limit(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Config {
    /// Process environment and arguments over the defaults
    pub fn load() -> Result<Self, ConfigError> {
        Config::from_env(None)?.with_args(std::env::args().skip(1))
    }

    /// Builds the configuration from `salesboard.toml` and `SALESBOARD_*`
    /// variables. `vars` replaces the process environment when given.
    pub fn from_env(vars: Option<config::Map<String, String>>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("salesboard").required(false))
            .add_source(
                config::Environment::with_prefix("SALESBOARD")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Applies `--host`, `--port` and `--data`, each followed by its value
    pub fn with_args<I>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            if !matches!(flag.as_str(), "--host" | "--port" | "--data") {
                return Err(ConfigError::UnknownArgument(flag));
            }
            let value = args
                .next()
                .ok_or_else(|| ConfigError::MissingValue(flag.clone()))?;
            match flag.as_str() {
                "--host" => self.host = value,
                "--port" => {
                    self.port = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        key: flag.clone(),
                        value: value.clone(),
                    })?
                }
                _ => self.data = PathBuf::from(value),
            }
        }
        Ok(self)
    }

    pub fn limits(&self) -> ViewLimits {
        ViewLimits {
            view_rows: self.view_rows,
            sample_rows: self.sample_rows,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn vars(list: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            list.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env(vars(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr(), "127.0.0.1:3000");
        assert_eq!(config.data, PathBuf::from("Superstore.xls"));
        assert_eq!(config.limits(), ViewLimits::default());
        assert_eq!(config.upload_limit, 200 * 1024 * 1024);
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_env_then_args() {
        let config = Config::from_env(vars(&[
            ("SALESBOARD_PORT", "8080"),
            ("SALESBOARD_DATA", "orders.csv"),
            ("SALESBOARD_VIEW_ROWS", "50"),
            ("SALESBOARD_UPLOAD_LIMIT", "1048576"),
            ("SALESBOARD_SESSION_TTL_SECS", "60"),
            ("OTHER_PORT", "1"),
        ]))
        .unwrap()
        .with_args(args(&["--port", "9000", "--host", "0.0.0.0"]))
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:9000");
        assert_eq!(config.data, PathBuf::from("orders.csv"));
        assert_eq!(config.limits().view_rows, 50);
        assert_eq!(config.limits().sample_rows, 5);
        assert_eq!(config.upload_limit, 1024 * 1024);
        assert_eq!(config.session_ttl_secs, 60);
    }

    #[test]
    fn test_bad_values() {
        let err = Config::from_env(vars(&[("SALESBOARD_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Source(_)));

        let err = Config::default()
            .with_args(args(&["--port", "http"]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, ref value } if key == "--port" && value == "http"
        ));

        assert!(matches!(
            Config::default().with_args(args(&["--data"])).unwrap_err(),
            ConfigError::MissingValue(flag) if flag == "--data"
        ));
        assert!(matches!(
            Config::default().with_args(args(&["--verbose"])).unwrap_err(),
            ConfigError::UnknownArgument(arg) if arg == "--verbose"
        ));
    }
}
