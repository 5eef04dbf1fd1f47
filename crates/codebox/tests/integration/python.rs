use std::time::Duration;

use codebox::service::classify;
use codebox::{CodeExecutor, RunnerOptions};

use super::{encode, entries, python_runner, test_config};

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_hello() {
    let runner = python_runner(test_config()).await;

    let result = runner
        .run(&encode("print('hi')"), RunnerOptions::default(), "", None)
        .await
        .expect("Execution failed");

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_timeout() {
    let runner = python_runner(test_config()).await;

    let result = runner
        .run(
            &encode("import time\ntime.sleep(9999)"),
            RunnerOptions::default(),
            "",
            Some(Duration::from_secs(2)),
        )
        .await
        .expect("Timeout must not be an error");

    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stderr, "Execution timeout");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_network_blocked() {
    let mut config = test_config();
    config.enable_network = false;
    let runner = python_runner(config).await;

    let code = "import socket\nsocket.socket(socket.AF_INET, socket.SOCK_STREAM)";
    let result = runner
        .run(
            &encode(code),
            RunnerOptions {
                enable_network: true,
            },
            "",
            None,
        )
        .await
        .expect("Execution failed");

    assert!(result.is_security_violation(), "{result:?}");
    assert_eq!(classify(result).unwrap_err().code(), 31);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_runtime_error() {
    let runner = python_runner(test_config()).await;

    let result = runner
        .run(&encode("raise SystemExit(3)"), RunnerOptions::default(), "", None)
        .await
        .expect("Execution failed");

    assert_eq!(result.exit_code, 3);
    assert!(!result.is_security_violation());
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_scripts_removed() {
    let config = test_config();
    let script_dir = config.python_root.join("tmp");
    let runner = python_runner(config).await;
    let before = entries(&script_dir);

    runner
        .run(&encode("print(1)"), RunnerOptions::default(), "", None)
        .await
        .expect("Execution failed");
    runner
        .run(
            &encode("while True: pass"),
            RunnerOptions::default(),
            "",
            Some(Duration::from_secs(1)),
        )
        .await
        .expect("Execution failed");

    assert_eq!(entries(&script_dir), before);
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_python_preload_ignored_when_disabled() {
    let mut config = test_config();
    config.enable_preload = false;
    let runner = python_runner(config).await;

    let result = runner
        .run(
            &encode("print('main')"),
            RunnerOptions::default(),
            "print('preload')",
            None,
        )
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout, "main\n");
}
