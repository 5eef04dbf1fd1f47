use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::interval::parse_interval;
use crate::types::Language;

mod env;
mod interval;
mod loader;

/// Example configuration embedded at compile time.
///
/// `codebox init` writes this out as a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codebox.example.yaml");

/// Default config file looked up when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid update interval {0:?}")]
    InvalidInterval(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// HTTP listener and authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub debug: bool,
    /// Shared secret expected in the `X-Api-Key` header
    pub key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8194,
            debug: true,
            key: "codebox-sandbox".to_string(),
        }
    }
}

/// Outbound proxy settings handed to sandboxed processes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub socks5: String,
    pub http: String,
    pub https: String,
}

impl ProxyConfig {
    /// Environment variables to export into a sandboxed process.
    ///
    /// A SOCKS5 proxy takes precedence and is exported under both
    /// `HTTPS_PROXY` and `HTTP_PROXY`.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        if !self.socks5.is_empty() {
            return vec![
                ("HTTPS_PROXY", self.socks5.clone()),
                ("HTTP_PROXY", self.socks5.clone()),
            ];
        }

        let mut vars = Vec::new();
        if !self.https.is_empty() {
            vars.push(("HTTPS_PROXY", self.https.clone()));
        }
        if !self.http.is_empty() {
            vars.push(("HTTP_PROXY", self.http.clone()));
        }
        vars
    }
}

/// Config for Codebox
///
/// Loaded once at startup, then shared read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,

    /// Maximum number of interpreter processes running at once
    pub max_workers: usize,

    /// Maximum number of admitted requests (running or waiting for a worker)
    pub max_requests: usize,

    /// Default execution timeout in seconds
    pub worker_timeout: u64,

    /// Deployment-wide network switch. A request can only narrow it.
    pub enable_network: bool,

    /// Honor the preload snippet sent with a request
    pub enable_preload: bool,

    /// Syscall numbers replacing the isolation library's built-in allowlist
    pub allowed_syscalls: Vec<i64>,

    pub proxy: ProxyConfig,

    pub python_path: PathBuf,
    /// Host paths mirrored into the Python sandbox root
    pub python_lib_paths: Vec<PathBuf>,
    /// Interval between dependency refreshes (`90s`, `30m`, `1h`). Empty disables.
    pub python_deps_update_interval: String,
    pub python_requirements: PathBuf,
    pub python_root: PathBuf,
    /// Release build of the Python isolation library
    pub python_lib_release: PathBuf,

    pub nodejs_path: PathBuf,
    /// Host paths mirrored into the Node.js sandbox root
    pub nodejs_lib_paths: Vec<PathBuf>,
    /// Directory holding `package.json` and `node_modules`
    pub nodejs_dependencies: PathBuf,
    pub nodejs_root: PathBuf,
    /// Release build of the Node.js isolation library
    pub nodejs_lib_release: PathBuf,

    pub sandbox_user: String,
    pub sandbox_uid: u32,
    pub sandbox_gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            max_workers: 4,
            max_requests: 50,
            worker_timeout: 30,
            enable_network: true,
            enable_preload: false,
            allowed_syscalls: Vec::new(),
            proxy: ProxyConfig::default(),
            python_path: PathBuf::from("/usr/local/bin/python3"),
            python_lib_paths: [
                "/usr/local/lib/python3.12",
                "/usr/lib/python3",
                "/usr/lib/x86_64-linux-gnu",
                "/etc/ssl/certs/ca-certificates.crt",
                "/etc/nsswitch.conf",
                "/etc/hosts",
                "/etc/resolv.conf",
                "/etc/localtime",
                "/usr/share/zoneinfo",
                "/etc/timezone",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            python_deps_update_interval: "30m".to_string(),
            python_requirements: PathBuf::from("dependencies/python/python-requirements.txt"),
            python_root: PathBuf::from("/var/sandbox/sandbox-python"),
            python_lib_release: PathBuf::from("lib/libpython.so"),
            nodejs_path: PathBuf::from("/usr/local/bin/node"),
            nodejs_lib_paths: [
                "/etc/ssl/certs/ca-certificates.crt",
                "/etc/nsswitch.conf",
                "/etc/resolv.conf",
                "/etc/hosts",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            nodejs_dependencies: PathBuf::from("dependencies/nodejs"),
            nodejs_root: PathBuf::from("/var/sandbox/sandbox-nodejs"),
            nodejs_lib_release: PathBuf::from("lib/libnodejs.so"),
            sandbox_user: "sandbox".to_string(),
            sandbox_uid: 65537,
            sandbox_gid: 0,
        }
    }
}

impl Config {
    /// Default execution timeout
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout)
    }

    /// Interval for the periodic dependency refresh, `None` when disabled
    pub fn deps_update_interval(&self) -> Result<Option<Duration>, ConfigError> {
        parse_interval(&self.python_deps_update_interval)
    }

    /// Interpreter binary for a language
    pub fn interpreter(&self, language: Language) -> &PathBuf {
        match language {
            Language::Python3 => &self.python_path,
            Language::Nodejs => &self.nodejs_path,
        }
    }

    /// Sandbox root directory for a language
    pub fn sandbox_root(&self, language: Language) -> &PathBuf {
        match language {
            Language::Python3 => &self.python_root,
            Language::Nodejs => &self.nodejs_root,
        }
    }

    /// Host paths mirrored into a language's sandbox root
    pub fn lib_paths(&self, language: Language) -> &[PathBuf] {
        match language {
            Language::Python3 => &self.python_lib_paths,
            Language::Nodejs => &self.nodejs_lib_paths,
        }
    }

    /// Release build of a language's isolation library
    pub fn lib_release(&self, language: Language) -> &PathBuf {
        match language {
            Language::Python3 => &self.python_lib_release,
            Language::Nodejs => &self.nodejs_lib_release,
        }
    }

    /// `ALLOWED_SYSCALLS` value for sandboxed processes, if overridden
    pub fn allowed_syscalls_env(&self) -> Option<String> {
        if self.allowed_syscalls.is_empty() {
            return None;
        }
        Some(
            self.allowed_syscalls
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Copy of this config with the API key hidden, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.app.key.is_empty() {
            config.app.key = "********".to_string();
        }
        config
    }
}
