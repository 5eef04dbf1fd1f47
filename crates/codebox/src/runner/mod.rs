//! Code runners for Codebox
//!
//! A runner turns base64 user code into a bootstrap script, starts the
//! language interpreter on it inside the language's sandbox root, and
//! captures the output under a timeout. Runners are selected by
//! [`Language`] through [`Executors`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::process::Command;

pub use crate::runner::nodejs::NodejsRunner;
pub use crate::runner::process::{exit_code, run_with_timeout};
pub use crate::runner::python::PythonRunner;
pub use crate::runner::script::{GeneratedScript, render};
use crate::config::Config;
use crate::sandbox::{ProvisionError, SandboxRoot};
use crate::types::{ExecutionResult, Language, RunnerOptions};

mod nodejs;
mod process;
mod python;
mod script;

/// Errors that occur while preparing or running a sandboxed process
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("code is not valid base64: {0}")]
    InvalidCode(#[from] base64::DecodeError),

    #[error("failed to write bootstrap script {path}: {source}")]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("child {0} pipe was not captured")]
    MissingPipe(&'static str),

    #[error("I/O error while collecting output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode runner options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("sandbox provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
}

/// Runs code for one language
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn language(&self) -> Language;

    /// Execute base64-encoded `code`.
    ///
    /// `timeout` defaults to the configured worker timeout. A timeout yields
    /// [`ExecutionResult::timeout`] rather than an error.
    async fn run(
        &self,
        code: &str,
        options: RunnerOptions,
        preload: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecuteError>;
}

/// Runner registry keyed by language
#[derive(Clone, Default)]
pub struct Executors {
    runners: HashMap<Language, Arc<dyn CodeExecutor>>,
}

impl Executors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner, replacing any previous one for its language
    pub fn register(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.runners.insert(executor.language(), executor);
        self
    }

    /// The Python and Node.js runners backed by their sandbox roots
    pub fn sandboxed(
        config: Arc<Config>,
        python_root: Arc<SandboxRoot>,
        nodejs_root: Arc<SandboxRoot>,
    ) -> Self {
        Self::new()
            .register(Arc::new(PythonRunner::new(config.clone(), python_root)))
            .register(Arc::new(NodejsRunner::new(config, nodejs_root)))
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn CodeExecutor>> {
        self.runners.get(&language)
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.runners.keys().copied()
    }
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.runners.keys()).finish()
    }
}

/// Decode request code, rejecting invalid base64 before anything touches disk
pub fn decode_code(code: &str) -> Result<Vec<u8>, ExecuteError> {
    Ok(BASE64.decode(code.trim())?)
}

/// Base command shared by all runners: cleared environment, proxy and
/// syscall overrides only, working directory at the sandbox root.
fn sandbox_command(config: &Config, interpreter: &Path, root: &SandboxRoot) -> Command {
    let mut command = Command::new(interpreter);
    command.env_clear().current_dir(root.path());
    for (name, value) in config.proxy.env_vars() {
        command.env(name, value);
    }
    if let Some(syscalls) = config.allowed_syscalls_env() {
        command.env("ALLOWED_SYSCALLS", syscalls);
    }
    command
}

/// Network access for one run: the request can only narrow the deployment setting
fn effective_options(config: &Config, options: RunnerOptions) -> RunnerOptions {
    RunnerOptions {
        enable_network: options.enable_network && config.enable_network,
    }
}
