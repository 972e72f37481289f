//! Table-driven tests for engine configuration loading and validation.

use harvester::config::{load_config_from_str, ConfigFormat};
use harvester::{EngineConfig, JobManager, StoreBackend};

struct ConfigTestCase {
    name: &'static str,
    content: &'static str,
    format: ConfigFormat,
    should_succeed: bool,
    /// Substring of the error message when loading fails.
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "empty_json_object",
        content: "{}",
        format: ConfigFormat::Json,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "full_json",
        content: r#"{
            "data_directory": "/var/lib/harvester",
            "store_backend": "sqlite",
            "output_directory": "/srv/harvest",
            "tick_interval_secs": 30,
            "stop_timeout_secs": 2,
            "recent_executions": 5,
            "event_capacity": 64,
            "defaults": { "delay_ms": 0, "timeout_ms": 5000 }
        }"#,
        format: ConfigFormat::Json,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "yaml_partial",
        content: "store_backend: json\ndefaults:\n  max_payload_bytes: 1024\n",
        format: ConfigFormat::Yaml,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "unknown_backend",
        content: r#"{ "store_backend": "postgres" }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("JSON"),
    },
    ConfigTestCase {
        name: "zero_tick_interval",
        content: "tick_interval_secs: 0\n",
        format: ConfigFormat::Yaml,
        should_succeed: false,
        expected_error: Some("tick_interval_secs"),
    },
    ConfigTestCase {
        name: "zero_event_capacity",
        content: r#"{ "event_capacity": 0 }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("event_capacity"),
    },
    ConfigTestCase {
        name: "zero_payload_limit",
        content: r#"{ "defaults": { "max_payload_bytes": 0 } }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("max_payload_bytes"),
    },
    ConfigTestCase {
        name: "malformed_yaml",
        content: "defaults: [unclosed\n",
        format: ConfigFormat::Yaml,
        should_succeed: false,
        expected_error: Some("YAML"),
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.content, case.format);
        match (&result, case.should_succeed) {
            (Ok(_), true) => {}
            (Err(e), false) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "{}: expected error containing '{}', got '{}'",
                        case.name,
                        expected,
                        e
                    );
                }
            }
            (Ok(_), false) => panic!("{}: expected failure, config loaded", case.name),
            (Err(e), true) => panic!("{}: expected success, got '{}'", case.name, e),
        }
    }
}

#[test]
fn test_full_config_values() {
    let config = load_config_from_str(CONFIG_TESTS[1].content, ConfigFormat::Json).unwrap();
    assert_eq!(config.store_backend, StoreBackend::Sqlite);
    assert_eq!(config.output_directory(), std::path::PathBuf::from("/srv/harvest"));
    assert_eq!(config.tick_interval().as_secs(), 30);
    assert_eq!(config.defaults.delay_ms, 0);
    assert_eq!(config.defaults.timeout_ms, 5000);
    // Unset job defaults keep their built-in values
    assert_eq!(config.defaults.retry_attempts, 3);
}

#[tokio::test]
async fn test_manager_opens_configured_sqlite_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::with_data_directory(dir.path());
    config.store_backend = StoreBackend::Sqlite;

    let manager = JobManager::open(config.clone()).unwrap();
    let job_id = manager
        .create_job(harvester::NewJob::new(
            "feed",
            harvester::JobKind::NewsMedia,
            vec!["https://a.example".into()],
        ))
        .unwrap();
    drop(manager);

    assert!(dir.path().join("harvester.db").exists());
    let reopened = JobManager::open(config).unwrap();
    assert!(reopened.get_job(&job_id).is_some());
}
