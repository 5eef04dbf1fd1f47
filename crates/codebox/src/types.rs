use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signal delivered by the kernel when a seccomp filter kills a process
pub const SECURITY_SIGNAL: i32 = libc::SIGSYS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

/// Languages with a sandboxed runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "python3")]
    Python3,
    #[serde(rename = "nodejs")]
    Nodejs,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python3, Language::Nodejs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python3 => "python3",
            Language::Nodejs => "nodejs",
        }
    }

    /// File name of the isolation library inside the sandbox root
    pub fn library_name(&self) -> &'static str {
        match self {
            Language::Python3 => "libpython.so",
            Language::Nodejs => "libnodejs.so",
        }
    }

    /// Extension of generated bootstrap scripts
    pub fn script_extension(&self) -> &'static str {
        match self {
            Language::Python3 => "py",
            Language::Nodejs => "js",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python3" => Ok(Language::Python3),
            "nodejs" => Ok(Language::Nodejs),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Per-request execution switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    #[serde(default)]
    pub enable_network: bool,
}

/// Captured outcome of one sandboxed process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit status, or the negated signal number when killed by a signal
    pub exit_code: i32,
    /// Set when the process was killed for exceeding its timeout
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecutionResult {
    pub const TIMEOUT_MESSAGE: &'static str = "Execution timeout";

    /// Result reported when the timeout expires
    pub fn timeout() -> Self {
        Self {
            stdout: String::new(),
            stderr: Self::TIMEOUT_MESSAGE.to_string(),
            exit_code: -1,
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Whether the process was killed by the seccomp filter.
    ///
    /// Interpreters are spawned directly, so only a negated `SIGSYS` means a
    /// signal kill; a plain exit status of any value is user code exiting.
    pub fn is_security_violation(&self) -> bool {
        !self.timed_out && self.exit_code == -SECURITY_SIGNAL
    }
}

/// An installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}
