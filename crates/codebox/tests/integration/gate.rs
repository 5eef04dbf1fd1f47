//! Worker bound through the full service path, with a counting executor

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use codebox::runner::ExecuteError;
use codebox::sandbox::{IsolationLibrary, SandboxRoot};
use codebox::service::RunRequest;
use codebox::{
    CodeExecutor, ConcurrencyGate, Config, DependencyManager, ExecutionResult, Executors,
    Language, RunnerOptions, SandboxService,
};
use tokio::task::JoinSet;

#[derive(Default)]
struct CountingExecutor {
    running: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl CodeExecutor for CountingExecutor {
    fn language(&self) -> Language {
        Language::Python3
    }

    async fn run(
        &self,
        _code: &str,
        _options: RunnerOptions,
        _preload: &str,
        _timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecuteError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
        })
    }
}

fn service(executor: Arc<CountingExecutor>, config: Config) -> SandboxService {
    let config = Arc::new(config);
    let library = IsolationLibrary::from_bytes("lib.so", b"lib".to_vec());
    let python = Arc::new(SandboxRoot::new(Language::Python3, "/nonexistent/py", library.clone()));
    let nodejs = Arc::new(SandboxRoot::new(Language::Nodejs, "/nonexistent/js", library));
    let deps = Arc::new(DependencyManager::new(config.clone(), python, nodejs));
    let gate = ConcurrencyGate::new(config.max_workers, config.max_requests);
    SandboxService::new(config, Executors::new().register(executor), deps, gate)
}

#[tokio::test]
async fn test_eight_requests_four_workers() {
    let executor = Arc::new(CountingExecutor::default());
    let config = Config {
        max_workers: 4,
        max_requests: 50,
        ..Config::default()
    };
    let service = service(executor.clone(), config);

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        set.spawn(async move {
            service
                .run(RunRequest {
                    language: "python3".to_string(),
                    code: "cHJpbnQoMSk=".to_string(),
                    preload: String::new(),
                    options: RunnerOptions::default(),
                })
                .await
        });
    }
    while let Some(result) = set.join_next().await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(executor.peak.load(Ordering::SeqCst), 4);
    assert_eq!(executor.finished.load(Ordering::SeqCst), 8);
    assert_eq!(service.gate().in_flight(), 0);
}
