//! A library for running untrusted Python and JavaScript.
//!
//! Codebox executes submitted code under a dropped identity and a seccomp
//! syscall filter installed by a small native isolation library. Each
//! language runs inside its own provisioned sandbox root, and a concurrency
//! gate bounds both admitted requests and running interpreters.
//!
//! # Features
//!
//! - **Seccomp isolation**: the interpreter loads the isolation library and calls `init_seccomp` before any user code runs.
//! - **Two runtimes**: Python 3 and Node.js behind one [`CodeExecutor`] contract.
//! - **Transport obfuscation**: code is XOR-ed with a fresh 64-byte key per run; the key travels only on the command line.
//! - **Admission control**: immediate rejection past `max_requests`, queuing past `max_workers`.
//! - **Dependency lifecycle**: pip install and refresh, vendored Node modules.
//! - **YAML configuration** with environment overrides.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG};
pub use deps::{DependencyError, DependencyManager};
pub use gate::{ConcurrencyGate, GateError};
pub use runner::{CodeExecutor, ExecuteError, Executors, NodejsRunner, PythonRunner};
pub use sandbox::{ProvisionError, SandboxRoot};
pub use service::{ApiResponse, SandboxService, ServiceError};
pub use types::{Dependency, ExecutionResult, Language, RunnerOptions, UnsupportedLanguage};

pub mod cipher;
pub mod config;
pub mod deps;
pub mod gate;
pub mod runner;
pub mod sandbox;
pub mod service;
pub mod types;
