use std::time::Duration;

use codebox::{CodeExecutor, RunnerOptions};

use super::{encode, nodejs_runner, test_config};

#[tokio::test]
#[ignore = "requires root"]
async fn test_nodejs_hello() {
    let runner = nodejs_runner(test_config()).await;

    let result = runner
        .run(&encode("console.log('hi')"), RunnerOptions::default(), "", None)
        .await
        .expect("Execution failed");

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "hi\n");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_nodejs_timeout() {
    let runner = nodejs_runner(test_config()).await;

    let result = runner
        .run(
            &encode("while (true) {}"),
            RunnerOptions::default(),
            "",
            Some(Duration::from_secs(2)),
        )
        .await
        .expect("Timeout must not be an error");

    assert!(result.timed_out);
    assert_eq!(result.stderr, "Execution timeout");
}

#[tokio::test]
#[ignore = "requires root"]
async fn test_nodejs_uncaught_exception() {
    let runner = nodejs_runner(test_config()).await;

    let result = runner
        .run(&encode("throw new Error('boom')"), RunnerOptions::default(), "", None)
        .await
        .expect("Execution failed");

    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("boom"));
}
