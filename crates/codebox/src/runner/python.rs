//! Python runner
//!
//! The bootstrap script receives the sandbox root and the base64 XOR key on
//! its command line; the obfuscated code is embedded in the script itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, instrument};

use crate::cipher::{self, KEY_LEN};
use crate::config::Config;
use crate::runner::{
    CodeExecutor, ExecuteError, GeneratedScript, decode_code, effective_options, render,
    run_with_timeout, sandbox_command,
};
use crate::sandbox::SandboxRoot;
use crate::types::{ExecutionResult, Language, RunnerOptions};

const PRESCRIPT: &str = include_str!("../../templates/prescript.py");

#[derive(Debug, Clone)]
pub struct PythonRunner {
    config: Arc<Config>,
    root: Arc<SandboxRoot>,
}

impl PythonRunner {
    pub fn new(config: Arc<Config>, root: Arc<SandboxRoot>) -> Self {
        Self { config, root }
    }

    /// Render the bootstrap script for already-decoded `code`
    fn build_script(&self, code: &[u8], key: &[u8], preload: &str, options: RunnerOptions) -> String {
        let uid = self.config.sandbox_uid.to_string();
        let gid = self.config.sandbox_gid.to_string();
        let network = if effective_options(&self.config, options).enable_network {
            "1"
        } else {
            "0"
        };
        let preload = if self.config.enable_preload { preload } else { "" };
        let obfuscated = BASE64.encode(cipher::xor(code, key));

        render(
            PRESCRIPT,
            &[
                ("library", Language::Python3.library_name()),
                ("uid", &uid),
                ("gid", &gid),
                ("enable_network", network),
                ("preload", preload),
                ("code", &obfuscated),
            ],
        )
    }
}

#[async_trait]
impl CodeExecutor for PythonRunner {
    fn language(&self) -> Language {
        Language::Python3
    }

    #[instrument(skip_all, fields(language = "python3"))]
    async fn run(
        &self,
        code: &str,
        options: RunnerOptions,
        preload: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecuteError> {
        let code = decode_code(code)?;
        self.root.ensure_library().await?;

        let key = cipher::generate_key(KEY_LEN);
        let contents = self.build_script(&code, &key, preload, options);
        let script = GeneratedScript::write(&self.root.script_dir(), "py", &contents).await?;

        let mut command = sandbox_command(&self.config, &self.config.python_path, &self.root);
        command
            .arg(script.path())
            .arg(self.root.path())
            .arg(BASE64.encode(&key));

        let timeout = timeout.unwrap_or_else(|| self.config.execution_timeout());
        debug!(script = %script.path().display(), ?timeout, "starting python");
        run_with_timeout(command, timeout).await
    }
}
