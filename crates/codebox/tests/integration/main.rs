//! Integration tests for codebox
//!
//! Runner tests need root, the interpreters named in the config, and the
//! isolation libraries built from `codebox-seccomp`. The config is read from
//! `CONFIG_PATH` (default `config.yaml`) with the usual environment overrides.
//! Run with: cargo test -p codebox --features integration-tests
//!
//! Tests that require root are marked `#[ignore]`. To include them:
//!    cargo test -p codebox --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use codebox::config::{Config, DEFAULT_CONFIG_PATH};
use codebox::sandbox::SandboxRoot;
use codebox::{Language, NodejsRunner, PythonRunner};

mod config_loading;
mod gate;
mod nodejs;
mod python;

/// Load the config the runner tests execute against
pub(crate) fn test_config() -> Config {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    Config::load(&path).unwrap_or_else(|e| panic!("Failed to load config {path}: {e}"))
}

pub(crate) fn encode(source: &str) -> String {
    BASE64.encode(source)
}

/// A provisioned root for `language`
pub(crate) async fn provisioned_root(config: &Config, language: Language) -> Arc<SandboxRoot> {
    let root = SandboxRoot::from_config(config, language).expect("Failed to load isolation library");
    root.provision(false).await.expect("Failed to provision sandbox root");
    Arc::new(root)
}

pub(crate) async fn python_runner(config: Config) -> PythonRunner {
    let root = provisioned_root(&config, Language::Python3).await;
    PythonRunner::new(Arc::new(config), root)
}

pub(crate) async fn nodejs_runner(config: Config) -> NodejsRunner {
    let root = provisioned_root(&config, Language::Nodejs).await;
    NodejsRunner::new(Arc::new(config), root)
}

/// Number of entries in a directory, zero if it does not exist
pub(crate) fn entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
