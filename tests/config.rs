use std::fs;

use serial_test::serial;
use taskpilot_cli::{ConfigLoader, EngineConfig, ErrorKind};

const FILE: &str = r#"
headless: false
timeout_secs: 45
retry_attempts: 4
default_provider: outlook
artifacts_dir: /tmp/taskpilot-artifacts
providers:
  outlook:
    email: me@outlook.com
    password: from-file
llm:
  model: gpt-4o
log:
  level: debug
"#;

struct EnvGuard(Vec<&'static str>);

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        Self(vars.iter().map(|(key, _)| *key).collect())
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.0 {
            std::env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn yaml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskpilot.yaml");
    fs::write(&path, FILE).unwrap();

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_prefix("TPTEST")
        .without_well_known_env()
        .load()
        .unwrap();

    assert!(!config.headless);
    assert_eq!(config.timeout_secs, 45);
    assert_eq!(config.retry_attempts, 4);
    assert_eq!(config.default_provider.as_deref(), Some("outlook"));
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.log.level, "debug");
    // Untouched values keep their defaults.
    assert_eq!(config.selector_timeout_ms, 5_000);
    assert_eq!(
        config.credentials_for("outlook").get("password"),
        Some("from-file")
    );
    config.validate(&["gmail", "outlook"]).unwrap();
}

#[test]
#[serial]
fn prefixed_environment_beats_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskpilot.yaml");
    fs::write(&path, FILE).unwrap();
    let _env = EnvGuard::set(&[
        ("TPTEST__TIMEOUT_SECS", "90"),
        ("TPTEST__HEADLESS", "true"),
        ("TPTEST__PROVIDERS__GMAIL__EMAIL", "me@gmail.com"),
    ]);

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_prefix("TPTEST")
        .without_well_known_env()
        .load()
        .unwrap();

    assert_eq!(config.timeout_secs, 90);
    assert!(config.headless);
    assert_eq!(config.retry_attempts, 4);
    assert_eq!(
        config.credentials_for("gmail").get("email"),
        Some("me@gmail.com")
    );
}

#[test]
#[serial]
fn well_known_variables_win_over_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskpilot.yaml");
    fs::write(&path, FILE).unwrap();
    let _env = EnvGuard::set(&[
        ("OUTLOOK_PASSWORD", "from-env"),
        ("GMAIL_EMAIL", "me@gmail.com"),
        ("GMAIL_PASSWORD", "hunter2"),
    ]);

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_prefix("TPTEST")
        .load()
        .unwrap();

    assert_eq!(
        config.credentials_for("outlook").get("password"),
        Some("from-env")
    );
    assert_eq!(
        config.credentials_for("outlook").get("email"),
        Some("me@outlook.com")
    );
    assert!(config.credentials_for("gmail").has("password"));
}

#[test]
#[serial]
fn missing_required_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigLoader::new()
        .with_file(dir.path().join("absent.yaml"))
        .with_env_prefix("TPTEST")
        .without_well_known_env()
        .load()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
#[serial]
fn missing_optional_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigLoader::new()
        .with_optional_file(dir.path().join("absent.yaml"))
        .with_env_prefix("TPTEST")
        .without_well_known_env()
        .load()
        .unwrap();
    let defaults = EngineConfig::default();
    assert_eq!(config.headless, defaults.headless);
    assert_eq!(config.timeout_secs, defaults.timeout_secs);
    assert_eq!(config.retry_policy(), defaults.retry_policy());
    assert_eq!(config.artifacts_dir, defaults.artifacts_dir);
    assert!(config.providers.is_empty());
    assert!(config.default_provider.is_none());
}

#[test]
#[serial]
fn malformed_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskpilot.yaml");
    fs::write(&path, "retry_attempts: lots\n").unwrap();

    let err = ConfigLoader::new()
        .with_file(&path)
        .with_env_prefix("TPTEST")
        .without_well_known_env()
        .load()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
