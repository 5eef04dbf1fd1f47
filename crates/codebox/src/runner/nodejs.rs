//! Node.js runner
//!
//! Node receives the sandbox root, uid, gid and the JSON-encoded runner
//! options on its command line. The user code is embedded as a base64 buffer
//! that the bootstrap `eval`s after the sandbox is in place.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::runner::{
    CodeExecutor, ExecuteError, GeneratedScript, decode_code, effective_options, render,
    run_with_timeout, sandbox_command,
};
use crate::sandbox::SandboxRoot;
use crate::types::{ExecutionResult, Language, RunnerOptions};

const PRESCRIPT: &str = include_str!("../../templates/prescript.js");

#[derive(Debug, Clone)]
pub struct NodejsRunner {
    config: Arc<Config>,
    root: Arc<SandboxRoot>,
}

impl NodejsRunner {
    pub fn new(config: Arc<Config>, root: Arc<SandboxRoot>) -> Self {
        Self { config, root }
    }

    /// Render the bootstrap script for already-decoded `code`
    fn build_script(&self, code: &[u8], preload: &str) -> String {
        // re-encoding the decoded bytes keeps the literal within the base64 alphabet
        let eval = format!(
            "eval(Buffer.from('{}', 'base64').toString('utf-8'))",
            BASE64.encode(code)
        );
        let preload = if self.config.enable_preload { preload } else { "" };

        render(
            PRESCRIPT,
            &[
                ("library", Language::Nodejs.library_name()),
                ("preload", preload),
                ("code", &eval),
            ],
        )
    }

    /// Interpreter invocation: script, root, uid, gid, then the options JSON
    fn build_command(&self, script: &Path, options: RunnerOptions) -> Result<Command, ExecuteError> {
        let options = serde_json::to_string(&effective_options(&self.config, options))?;
        let mut command = sandbox_command(&self.config, &self.config.nodejs_path, &self.root);
        command
            .env("UV_USE_IO_URING", "0")
            .arg(script)
            .arg(self.root.path())
            .arg(self.config.sandbox_uid.to_string())
            .arg(self.config.sandbox_gid.to_string())
            .arg(options);
        Ok(command)
    }
}

#[async_trait]
impl CodeExecutor for NodejsRunner {
    fn language(&self) -> Language {
        Language::Nodejs
    }

    #[instrument(skip_all, fields(language = "nodejs"))]
    async fn run(
        &self,
        code: &str,
        options: RunnerOptions,
        preload: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecuteError> {
        let code = decode_code(code)?;
        self.root.ensure_library().await?;

        let contents = self.build_script(&code, preload);
        let script = GeneratedScript::write(&self.root.script_dir(), "js", &contents).await?;
        let command = self.build_command(script.path(), options)?;

        let timeout = timeout.unwrap_or_else(|| self.config.execution_timeout());
        debug!(script = %script.path().display(), ?timeout, "starting node");
        run_with_timeout(command, timeout).await
    }
}
