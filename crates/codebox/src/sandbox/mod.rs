//! Per-language sandbox roots
//!
//! A sandbox root is the directory a runner `chroot`s into. It holds the
//! isolation library, copies of the host runtime files the interpreter needs,
//! and a scratch directory for generated bootstrap scripts. Roots persist
//! across restarts and are never torn down by the service.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub use crate::sandbox::library::{IsolationLibrary, LibraryInfo};
pub use crate::sandbox::mirror::{MirrorStats, copy_tree, mirror_paths};
pub use crate::sandbox::user::{ensure_sandbox_user, require_root};
use crate::config::Config;
use crate::types::Language;

mod library;
mod mirror;
mod user;

/// Directory under a Node.js root holding the dependency tree
pub const NODE_MODULES_DIR: &str = "node_temp";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("isolation library not readable at {path}: {source}")]
    LibraryMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("isolation library at {0} is empty")]
    LibraryEmpty(PathBuf),

    #[error("failed to inspect isolation library: {0}")]
    Inspect(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to mirror {path} into the sandbox root: {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("provisioning task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("the sandbox service must run as root")]
    NotRoot,

    #[error("failed to create sandbox user '{user}': {message}")]
    CreateUser { user: String, message: String },

    #[error("sandbox user '{0}' not found")]
    UserNotFound(String),
}

/// A provisioned directory tree for one language
#[derive(Debug, Clone)]
pub struct SandboxRoot {
    language: Language,
    path: PathBuf,
    library: IsolationLibrary,
    lib_paths: Vec<PathBuf>,
    /// Node.js dependency tree copied into [`NODE_MODULES_DIR`]
    modules: Option<PathBuf>,
}

impl SandboxRoot {
    pub fn new(language: Language, path: impl Into<PathBuf>, library: IsolationLibrary) -> Self {
        Self {
            language,
            path: path.into(),
            library,
            lib_paths: Vec::new(),
            modules: None,
        }
    }

    /// Build the root for `language` from config, reading the release
    /// isolation library into memory.
    pub fn from_config(config: &Config, language: Language) -> Result<Self, ProvisionError> {
        let library = IsolationLibrary::load(config.lib_release(language))?;
        let root = Self::new(language, config.sandbox_root(language), library)
            .with_lib_paths(config.lib_paths(language).to_vec());
        Ok(match language {
            Language::Python3 => root,
            Language::Nodejs => root.with_modules(&config.nodejs_dependencies),
        })
    }

    pub fn with_lib_paths(mut self, lib_paths: Vec<PathBuf>) -> Self {
        self.lib_paths = lib_paths;
        self
    }

    pub fn with_modules(mut self, modules: impl Into<PathBuf>) -> Self {
        self.modules = Some(modules.into());
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn library(&self) -> &IsolationLibrary {
        &self.library
    }

    /// Where the isolation library lives inside the root
    pub fn library_path(&self) -> PathBuf {
        self.path.join(self.language.library_name())
    }

    /// Directory receiving generated bootstrap scripts
    pub fn script_dir(&self) -> PathBuf {
        match self.language {
            Language::Python3 => self.path.join("tmp"),
            Language::Nodejs => self.path.join(NODE_MODULES_DIR).join("tmp"),
        }
    }

    pub async fn library_available(&self) -> bool {
        tokio::fs::try_exists(self.library_path())
            .await
            .unwrap_or(false)
    }

    /// Write the isolation library into the root.
    ///
    /// An existing copy is kept unless `force` is set. The new file is written
    /// beside the target and renamed into place, so concurrent callers never
    /// observe a partial library.
    #[instrument(skip(self), fields(language = %self.language))]
    pub async fn release_library(&self, force: bool) -> Result<(), ProvisionError> {
        let target = self.library_path();
        if !force && self.library_available().await {
            debug!(path = %target.display(), "isolation library already present");
            return Ok(());
        }

        let result = self.write_library(&target).await;
        match &result {
            Ok(()) => info!(path = %target.display(), "isolation library released"),
            Err(e) => error!(critical = true, error = %e, "failed to release isolation library"),
        }
        result
    }

    async fn write_library(&self, target: &Path) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(write_error(&self.path))?;
        tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(write_error(&self.path))?;

        let staging = self.path.join(format!(
            ".{}.{}",
            self.language.library_name(),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&staging, self.library.bytes())
            .await
            .map_err(write_error(&staging))?;
        tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(write_error(&staging))?;
        if let Err(e) = tokio::fs::rename(&staging, target).await {
            tokio::fs::remove_file(&staging).await.ok();
            return Err(ProvisionError::Write {
                path: target.to_path_buf(),
                source: e,
            });
        }
        Ok(())
    }

    /// Extract the library on first use. Called before every execution.
    pub async fn ensure_library(&self) -> Result<(), ProvisionError> {
        if self.library_available().await {
            return Ok(());
        }
        self.release_library(false).await
    }

    /// Mirror the configured host library paths into the root
    #[instrument(skip(self), fields(language = %self.language))]
    pub async fn mirror_libraries(&self) -> Result<MirrorStats, ProvisionError> {
        let root = self.path.clone();
        let lib_paths = self.lib_paths.clone();
        let stats = tokio::task::spawn_blocking(move || mirror_paths(&root, &lib_paths))
            .await?
            .map_err(|source| ProvisionError::Mirror {
                path: self.path.clone(),
                source,
            })?;
        info!(
            files = stats.files,
            dirs = stats.dirs,
            links = stats.links,
            skipped = stats.skipped,
            "host libraries mirrored"
        );
        Ok(stats)
    }

    /// Copy the Node.js dependency tree into [`NODE_MODULES_DIR`].
    ///
    /// Files become read-only for the sandbox user. A root without a module
    /// source, or a missing source directory, is a no-op.
    #[instrument(skip(self), fields(language = %self.language))]
    pub async fn install_modules(&self) -> Result<MirrorStats, ProvisionError> {
        let Some(source) = self.modules.clone() else {
            return Ok(MirrorStats::default());
        };
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            warn!(path = %source.display(), "dependency directory not found");
            return Ok(MirrorStats::default());
        }

        let root = self.path.clone();
        let dest = self.path.join(NODE_MODULES_DIR);
        let source_path = source.clone();
        let stats = tokio::task::spawn_blocking(move || copy_tree(&root, &source_path, &dest))
            .await?
            .map_err(|e| ProvisionError::Mirror { path: source, source: e })?;
        info!(files = stats.files, "dependency tree installed");
        Ok(stats)
    }

    /// Full provisioning: library, dependency tree and host libraries
    pub async fn provision(&self, force: bool) -> Result<(), ProvisionError> {
        self.release_library(force).await?;
        self.install_modules().await?;
        self.mirror_libraries().await?;
        Ok(())
    }
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError {
    let path = path.to_path_buf();
    move |source| ProvisionError::Write { path, source }
}
