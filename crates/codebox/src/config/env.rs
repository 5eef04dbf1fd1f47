//! Environment variable overrides
//!
//! Applied after the config file. Booleans accept `true`, `1` or `yes`
//! (case-insensitive, anything else is false); list variables are
//! comma-separated.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{Config, ConfigError};

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl Config {
    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEBUG") {
            self.app.debug = parse_bool(&v);
        }
        if let Some(v) = lookup("MAX_WORKERS") {
            self.max_workers = parse_number("MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MAX_REQUESTS") {
            self.max_requests = parse_number("MAX_REQUESTS", &v)?;
        }
        if let Some(v) = lookup("SANDBOX_PORT") {
            self.app.port = parse_number("SANDBOX_PORT", &v)?;
        }
        if let Some(v) = lookup("WORKER_TIMEOUT") {
            self.worker_timeout = parse_number("WORKER_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("API_KEY") {
            self.app.key = v;
        }
        if let Some(v) = lookup("NODEJS_PATH") {
            self.nodejs_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ENABLE_NETWORK") {
            self.enable_network = parse_bool(&v);
        }
        if let Some(v) = lookup("ENABLE_PRELOAD") {
            self.enable_preload = parse_bool(&v);
        }
        if let Some(v) = lookup("ALLOWED_SYSCALLS") {
            self.allowed_syscalls = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse_number("ALLOWED_SYSCALLS", s))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = lookup("SOCKS5_PROXY") {
            self.proxy.socks5 = v;
        }
        if let Some(v) = lookup("HTTP_PROXY") {
            self.proxy.http = v;
        }
        if let Some(v) = lookup("HTTPS_PROXY") {
            self.proxy.https = v;
        }
        if let Some(v) = lookup("PYTHON_PATH") {
            self.python_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PYTHON_LIB_PATH") {
            self.python_lib_paths = parse_paths(&v);
        }
        if let Some(v) = lookup("PYTHON_DEPS_UPDATE_INTERVAL") {
            self.python_deps_update_interval = v;
        }
        if let Some(v) = lookup("NODEJS_LIB_PATH") {
            self.nodejs_lib_paths = parse_paths(&v);
        }

        Ok(())
    }
}
