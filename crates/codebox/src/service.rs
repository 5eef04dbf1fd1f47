//! Service layer between the HTTP surface and the runners
//!
//! Requests arrive with a free-form language string, which is validated
//! before anything else happens. Execution passes through the admission
//! counter, then the worker semaphore, then the language's runner. Outcomes
//! are classified into the response codes callers rely on to tell security
//! violations and timeouts apart from ordinary failures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::Config;
use crate::deps::{DependencyError, DependencyManager};
use crate::gate::{ConcurrencyGate, GateError};
use crate::runner::{ExecuteError, Executors};
use crate::types::{Dependency, ExecutionResult, Language, RunnerOptions, UnsupportedLanguage};

/// Envelope code for a successful call
pub const SUCCESS_CODE: i32 = 0;
pub const SUCCESS_MESSAGE: &str = "success";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unsupported language")]
    Validation(#[from] UnsupportedLanguage),

    #[error("sandbox security policy violation")]
    SecurityViolation,

    #[error("{}", ExecutionResult::TIMEOUT_MESSAGE)]
    Timeout,

    #[error("{}", runtime_message(.exit_code, .stderr))]
    Runtime { exit_code: i32, stderr: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Provisioning(DependencyError),

    #[error("Too many requests")]
    AdmissionRejected(#[from] GateError),

    #[error("{0}")]
    Internal(#[from] ExecuteError),
}

fn runtime_message(exit_code: &i32, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("process exited with code {exit_code}")
    } else {
        stderr.to_string()
    }
}

impl From<DependencyError> for ServiceError {
    fn from(err: DependencyError) -> Self {
        match err {
            DependencyError::InvalidPackage(_) => ServiceError::InvalidRequest(err.to_string()),
            other => ServiceError::Provisioning(other),
        }
    }
}

impl ServiceError {
    /// Envelope code reported to callers
    pub fn code(&self) -> i32 {
        match self {
            ServiceError::Validation(_) | ServiceError::InvalidRequest(_) => -400,
            ServiceError::SecurityViolation => 31,
            ServiceError::Timeout => -1,
            ServiceError::Runtime { exit_code, .. } => *exit_code,
            ServiceError::Provisioning(_) => 500,
            ServiceError::AdmissionRejected(_) => -503,
            ServiceError::Internal(_) => -500,
        }
    }

    /// Whether the request was turned away for lack of capacity
    pub fn is_overloaded(&self) -> bool {
        matches!(self, ServiceError::AdmissionRejected(_))
    }
}

/// Response envelope shared by every sandbox route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: SUCCESS_MESSAGE.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl<T> From<&ServiceError> for ApiResponse<T> {
    fn from(err: &ServiceError) -> Self {
        ApiResponse::error(err.code(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub language: String,
    /// Base64-encoded source
    pub code: String,
    #[serde(default)]
    pub preload: String,
    #[serde(default)]
    pub options: RunnerOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDependenciesQuery {
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDependenciesResponse {
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDependenciesRequest {
    pub language: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDependenciesResponse {
    pub success: bool,
    pub installed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Map a finished run to the caller-facing outcome
pub fn classify(result: ExecutionResult) -> Result<RunOutput, ServiceError> {
    if result.timed_out {
        return Err(ServiceError::Timeout);
    }
    if result.is_security_violation() {
        return Err(ServiceError::SecurityViolation);
    }
    if result.exit_code != 0 {
        return Err(ServiceError::Runtime {
            exit_code: result.exit_code,
            stderr: result.stderr,
        });
    }
    Ok(RunOutput {
        stdout: result.stdout,
        stderr: result.stderr,
    })
}

/// Everything a request handler needs, shared across requests
#[derive(Debug, Clone)]
pub struct SandboxService {
    config: Arc<Config>,
    executors: Executors,
    deps: Arc<DependencyManager>,
    gate: ConcurrencyGate,
}

impl SandboxService {
    pub fn new(
        config: Arc<Config>,
        executors: Executors,
        deps: Arc<DependencyManager>,
        gate: ConcurrencyGate,
    ) -> Self {
        Self {
            config,
            executors,
            deps,
            gate,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn deps(&self) -> &Arc<DependencyManager> {
        &self.deps
    }

    /// Validate, admit, wait for a worker, execute and classify
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn run(&self, request: RunRequest) -> Result<RunOutput, ServiceError> {
        let language: Language = request.language.parse()?;
        let executor = self
            .executors
            .get(language)
            .cloned()
            .ok_or_else(|| UnsupportedLanguage(request.language.clone()))?;

        let _admission = self.gate.try_admit()?;
        let _worker = self.gate.acquire_worker().await?;
        debug!(in_flight = self.gate.in_flight(), "worker acquired");

        let result = executor
            .run(&request.code, request.options, &request.preload, None)
            .await
            .inspect_err(|e| error!(error = %e, "execution failed"))?;

        let outcome = classify(result);
        if let Err(ServiceError::SecurityViolation) = &outcome {
            warn!("process killed by the syscall filter");
        }
        outcome
    }

    #[instrument(skip(self))]
    pub async fn list_dependencies(
        &self,
        language: &str,
    ) -> Result<ListDependenciesResponse, ServiceError> {
        let language: Language = language.parse()?;
        let dependencies = self.deps.list(language).await?;
        Ok(ListDependenciesResponse { dependencies })
    }

    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn update_dependencies(
        &self,
        request: UpdateDependenciesRequest,
    ) -> Result<UpdateDependenciesResponse, ServiceError> {
        let language: Language = request.language.parse()?;
        let installed = self.deps.update(language, &request.packages).await?;
        Ok(UpdateDependenciesResponse {
            success: true,
            installed,
        })
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::testing::*;
    use super::*;

    fn request(language: &str) -> RunRequest {
        RunRequest {
            language: language.to_string(),
            code: "cHJpbnQoJ2hpJyk=".to_string(),
            preload: String::new(),
            options: RunnerOptions::default(),
        }
    }

    #[test]
    fn classify_outcomes() {
        assert_eq!(
            classify(ok("hi\n")).unwrap(),
            RunOutput {
                stdout: "hi\n".to_string(),
                stderr: String::new()
            }
        );

        let err = classify(ExecutionResult::timeout()).unwrap_err();
        assert_eq!(err.code(), -1);
        assert_eq!(err.to_string(), "Execution timeout");

        let killed = ExecutionResult {
            exit_code: -libc::SIGSYS,
            ..ok("")
        };
        let err = classify(killed).unwrap_err();
        assert_eq!(err.code(), 31);
        assert_eq!(err.to_string(), "sandbox security policy violation");

        let failed = ExecutionResult {
            stderr: "NameError".to_string(),
            exit_code: 1,
            ..ok("")
        };
        let err = classify(failed).unwrap_err();
        assert_eq!(err.code(), 1);
        assert_eq!(err.to_string(), "NameError");
    }

    #[test]
    fn exit_status_matching_shell_signal_code_is_runtime_failure() {
        let err = classify(ExecutionResult {
            stderr: "bye".to_string(),
            exit_code: 128 + libc::SIGSYS,
            ..ok("")
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::Runtime { .. }));
        assert_eq!(err.code(), 159);
        assert_eq!(err.to_string(), "bye");
    }

    #[test]
    fn silent_failure_still_has_message() {
        let err = classify(ExecutionResult {
            exit_code: 3,
            ..ok("")
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "process exited with code 3");
    }

    #[test]
    fn envelope_serialization() {
        let ok = serde_json::to_value(ApiResponse::success(RunOutput {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
        }))
        .unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"code": 0, "message": "success", "data": {"stdout": "hi\n", "stderr": ""}})
        );

        let err = ServiceError::Validation(UnsupportedLanguage("ruby".to_string()));
        let body = serde_json::to_value(ApiResponse::<()>::from(&err)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"code": -400, "message": "unsupported language", "data": null})
        );
    }

    #[test]
    fn run_request_defaults() {
        let req: RunRequest =
            serde_json::from_str(r#"{"language":"python3","code":"eA=="}"#).unwrap();
        assert_eq!(req.preload, "");
        assert!(!req.options.enable_network);
    }

    #[tokio::test]
    async fn run_success() {
        let executor = Arc::new(FakeExecutor::new(Language::Python3, ok("hi\n")));
        let service = service(executor.clone(), Config::default());
        let output = service.run(request("python3")).await.unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.gate().in_flight(), 0);
    }

    #[tokio::test]
    async fn unsupported_language_never_reaches_runner() {
        let executor = Arc::new(FakeExecutor::new(Language::Python3, ok("")));
        let service = service(executor.clone(), Config::default());

        let err = service.run(request("ruby")).await.unwrap_err();
        assert_eq!(err.code(), -400);
        // Supported language without a registered runner
        let err = service.run(request("nodejs")).await.unwrap_err();
        assert_eq!(err.code(), -400);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

        let err = service.list_dependencies("ruby").await.unwrap_err();
        assert_eq!(err.code(), -400);
    }

    #[tokio::test]
    async fn option_shaped_package_is_validation_error() {
        let executor = Arc::new(FakeExecutor::new(Language::Python3, ok("")));
        let service = service(executor, Config::default());
        let err = service
            .update_dependencies(UpdateDependenciesRequest {
                language: "python3".to_string(),
                packages: vec!["--target=/etc".to_string()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), -400);
        assert_eq!(err.to_string(), "invalid package specifier '--target=/etc'");
    }

    #[tokio::test]
    async fn invalid_code_is_internal_error() {
        let executor = Arc::new(FakeExecutor::new(Language::Python3, ok("")));
        let service = service(executor, Config::default());
        let mut req = request("python3");
        req.code = "!!not base64!!".to_string();
        let err = service.run(req).await.unwrap_err();
        assert_eq!(err.code(), -500);
    }

    #[tokio::test]
    async fn excess_requests_rejected_immediately() {
        let mut executor = FakeExecutor::new(Language::Python3, ok(""));
        executor.delay = Duration::from_millis(300);
        let config = Config {
            max_workers: 1,
            max_requests: 2,
            ..Config::default()
        };
        let service = service(Arc::new(executor), config);

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.run(request("python3")).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.run(request("python3")).await }
        });
        while service.gate().in_flight() < 2 {
            tokio::task::yield_now().await;
        }

        let started = std::time::Instant::now();
        let err = service.run(request("python3")).await.unwrap_err();
        assert!(err.is_overloaded());
        assert_eq!(err.code(), -503);
        assert_eq!(err.to_string(), "Too many requests");
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(service.gate().in_flight(), 0);
    }
}
