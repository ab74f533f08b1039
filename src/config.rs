//! Runtime settings. Defaults match the fixed protocol; environment
//! variables override them for deployment and tests.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::framing::DEFAULT_MAX_LINE_LEN;

pub const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {var}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub max_line_len: usize,
    pub outbound_capacity: usize,
    pub idle_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub status_listen: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            outbound_capacity: 256,
            idle_timeout: None,
            write_timeout: Duration::from_secs(10),
            status_listen: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("RELAY_ADDR") {
            config.listen = addr;
        }
        if let Some(n) = parse_var(&lookup, "RELAY_MAX_LINE")? {
            config.max_line_len = n;
        }
        if let Some(n) = parse_var(&lookup, "RELAY_QUEUE")? {
            config.outbound_capacity = n;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "RELAY_IDLE_SECS")? {
            config.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var(&lookup, "RELAY_WRITE_SECS")? {
            config.write_timeout = Duration::from_secs(secs);
        }
        config.status_listen = lookup("RELAY_STATUS_ADDR").filter(|s| !s.is_empty());

        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub max_line_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = Self::default();

        if let Some(addr) = lookup("RELAY_SERVER") {
            config.server = addr;
        }
        if let Some(n) = parse_var(&lookup, "RELAY_MAX_LINE")? {
            config.max_line_len = n;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { var, value }),
    }
}
