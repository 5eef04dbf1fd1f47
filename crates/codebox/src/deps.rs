//! Dependency lifecycle
//!
//! Python packages are installed on the host interpreter with pip from a
//! requirements file. Node.js packages are vendored in a dependency directory
//! and copied into the Node sandbox root. Updates are full reinstalls: the
//! requirements file is re-applied with `--upgrade`, plus any extra packages
//! a caller names.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::sandbox::{ProvisionError, SandboxRoot};
use crate::types::{Dependency, Language};

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("invalid package manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("invalid package specifier '{0}'")]
    InvalidPackage(String),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// Reject caller-supplied specifiers that pip would read as options
pub fn validate_packages(packages: &[String]) -> Result<(), DependencyError> {
    match packages.iter().find(|p| p.trim_start().starts_with('-')) {
        Some(package) => Err(DependencyError::InvalidPackage(package.clone())),
        None => Ok(()),
    }
}

/// Requirement specifiers from a requirements file, without blanks or comments
pub fn parse_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parse `pip list --format=freeze` output into name and version pairs
pub fn parse_freeze(output: &str) -> Vec<Dependency> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.trim().split_once("==")?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Dependency {
                name: name.to_string(),
                version: version.trim().to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: std::collections::BTreeMap<String, String>,
}

/// Dependencies declared in a `package.json`, sorted by name
pub fn parse_package_manifest(json: &str) -> Result<Vec<Dependency>, DependencyError> {
    let manifest: PackageManifest = serde_json::from_str(json)?;
    Ok(manifest
        .dependencies
        .into_iter()
        .map(|(name, version)| Dependency { name, version })
        .collect())
}

/// Installs, lists and refreshes per-language packages
#[derive(Debug, Clone)]
pub struct DependencyManager {
    config: Arc<Config>,
    python_root: Arc<SandboxRoot>,
    nodejs_root: Arc<SandboxRoot>,
}

impl DependencyManager {
    pub fn new(
        config: Arc<Config>,
        python_root: Arc<SandboxRoot>,
        nodejs_root: Arc<SandboxRoot>,
    ) -> Self {
        Self {
            config,
            python_root,
            nodejs_root,
        }
    }

    pub fn root(&self, language: Language) -> &Arc<SandboxRoot> {
        match language {
            Language::Python3 => &self.python_root,
            Language::Nodejs => &self.nodejs_root,
        }
    }

    /// Startup sequence: install Python packages, then provision both roots.
    ///
    /// A failed pip install is logged and does not block provisioning; a
    /// provisioning failure is returned.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> Result<(), DependencyError> {
        info!("installing python dependencies");
        if let Err(e) = self.install_python(&[]).await {
            error!(error = %e, "failed to install python dependencies");
        }

        for root in [&self.python_root, &self.nodejs_root] {
            info!(language = %root.language(), "preparing sandbox root");
            root.provision(false).await?;
            info!(language = %root.language(), "sandbox root ready");
        }
        Ok(())
    }

    /// `pip install --upgrade` the requirements file plus `extra` packages.
    ///
    /// Returns the specifiers handed to pip. A missing or empty requirements
    /// file with no extras is a no-op.
    #[instrument(skip(self))]
    pub async fn install_python(&self, extra: &[String]) -> Result<Vec<String>, DependencyError> {
        validate_packages(extra)?;
        let mut packages = self.read_requirements().await?;
        for package in extra {
            let package = package.trim();
            if !package.is_empty() && !packages.iter().any(|p| p == package) {
                packages.push(package.to_string());
            }
        }

        if packages.is_empty() {
            info!("no python requirements to install");
            return Ok(packages);
        }

        let mut command = self.pip();
        command.args(["install", "--upgrade"]).args(&packages);
        run_checked(command, "pip install").await?;
        info!(count = packages.len(), "python dependencies installed");
        Ok(packages)
    }

    async fn read_requirements(&self) -> Result<Vec<String>, DependencyError> {
        let path = &self.config.python_requirements;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(parse_requirements(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "python requirements file not found");
                Ok(Vec::new())
            }
            Err(source) => Err(DependencyError::Read {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Installed packages for a language
    #[instrument(skip(self))]
    pub async fn list(&self, language: Language) -> Result<Vec<Dependency>, DependencyError> {
        match language {
            Language::Python3 => {
                let mut command = self.pip();
                command.args(["list", "--format=freeze"]);
                let stdout = run_checked(command, "pip list").await?;
                Ok(parse_freeze(&stdout))
            }
            Language::Nodejs => self.nodejs_manifest().await,
        }
    }

    /// Refresh a language's packages and return what was installed
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        language: Language,
        packages: &[String],
    ) -> Result<Vec<String>, DependencyError> {
        validate_packages(packages)?;
        match language {
            Language::Python3 => self.install_python(packages).await,
            Language::Nodejs => {
                if !packages.is_empty() {
                    warn!(
                        ?packages,
                        "node packages are vendored, extra packages are ignored"
                    );
                }
                self.nodejs_root.install_modules().await?;
                Ok(self
                    .nodejs_manifest()
                    .await?
                    .into_iter()
                    .map(|dep| dep.name)
                    .collect())
            }
        }
    }

    /// Refresh Python packages every `interval`, forever.
    ///
    /// Failures are logged and the loop keeps going.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration) {
        info!(?interval, "starting periodic dependency updates");
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            info!("updating python dependencies");
            match self.update(Language::Python3, &[]).await {
                Ok(installed) => info!(count = installed.len(), "python dependencies updated"),
                Err(e) => error!(error = %e, "failed to update python dependencies"),
            }
        }
    }

    async fn nodejs_manifest(&self) -> Result<Vec<Dependency>, DependencyError> {
        let path = self.config.nodejs_dependencies.join("package.json");
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => parse_package_manifest(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(DependencyError::Read { path, source }),
        }
    }

    fn pip(&self) -> Command {
        pip_command(&self.config.python_path)
    }
}

fn pip_command(python: &Path) -> Command {
    let mut command = Command::new(python);
    command.args(["-m", "pip"]);
    command
}

/// Run a host command, returning stdout or a [`DependencyError::CommandFailed`]
async fn run_checked(mut command: Command, label: &str) -> Result<String, DependencyError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| DependencyError::Spawn {
            command: label.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DependencyError::CommandFailed {
            command: label.to_string(),
            status: crate::runner::exit_code(output.status),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
