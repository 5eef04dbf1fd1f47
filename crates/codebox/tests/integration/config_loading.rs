use std::time::Duration;

use codebox::Config;

#[test]
fn test_load_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "app:\n  port: 9000\n  key: secret\nmax_workers: 2\nworker_timeout: 5\npython_deps_update_interval: 2h\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.app.port, 9000);
    assert_eq!(config.app.key, "secret");
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.max_requests, 50);
    assert_eq!(config.execution_timeout(), Duration::from_secs(5));
    assert_eq!(
        config.deps_update_interval().unwrap(),
        Some(Duration::from_secs(7200))
    );
}

#[test]
fn test_example_config_parses() {
    let config = Config::parse_yaml(codebox::EXAMPLE_CONFIG).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_worker_count_rejected() {
    assert!(Config::parse_yaml("max_workers: 0\n").is_err());
}
