//! Layered configuration loading: base file, environment overlay, env vars

use std::fs;

use docsync_orchestrator::config::{ConfigLoader, ConfigurationError, CoordinationBackend};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write config file");
    path
}

#[test]
fn test_overlay_overrides_base_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(
        &dir,
        "orchestration.toml",
        r#"
[scheduling]
interval_seconds = 30

[watchdog]
interval_seconds = 60
liveness_ttl_seconds = 300
"#,
    );
    write(
        &dir,
        "staging.toml",
        r#"
[watchdog]
liveness_ttl_seconds = 900
"#,
    );

    let config = ConfigLoader::new(&base)
        .with_environment("staging")
        .with_env_prefix("DOCSYNC_IT_OVERLAY")
        .load()?;
    assert_eq!(config.scheduling.interval_seconds, 30);
    assert_eq!(config.watchdog.interval_seconds, 60);
    assert_eq!(config.watchdog.liveness_ttl_seconds, 900);
    // Untouched sections keep their defaults
    assert_eq!(config.indexing.poll_interval_seconds, 5);
    Ok(())
}

#[test]
fn test_environment_variables_win() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(
        &dir,
        "orchestration.toml",
        r#"
[watchdog]
enabled = true
"#,
    );

    std::env::set_var("DOCSYNC_IT_ENVWIN__WATCHDOG__ENABLED", "false");
    std::env::set_var("DOCSYNC_IT_ENVWIN__MONITOR__SOFT_TIME_LIMIT_SECONDS", "42");
    let loaded = ConfigLoader::new(&base)
        .with_environment("test")
        .with_env_prefix("DOCSYNC_IT_ENVWIN")
        .load();
    std::env::remove_var("DOCSYNC_IT_ENVWIN__WATCHDOG__ENABLED");
    std::env::remove_var("DOCSYNC_IT_ENVWIN__MONITOR__SOFT_TIME_LIMIT_SECONDS");

    let config = loaded?;
    assert!(!config.watchdog.enabled);
    assert_eq!(config.monitor.soft_time_limit_seconds, 42);
    Ok(())
}

#[test]
fn test_invalid_merged_config_is_rejected() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(
        &dir,
        "orchestration.toml",
        r#"
[watchdog]
interval_seconds = 120
liveness_ttl_seconds = 60
"#,
    );

    let err = ConfigLoader::new(&base)
        .with_environment("test")
        .with_env_prefix("DOCSYNC_IT_INVALID")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { ref field, .. } if field == "watchdog.liveness_ttl_seconds"));
    Ok(())
}

#[test]
fn test_malformed_toml_is_a_parse_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(&dir, "orchestration.toml", "[scheduling\ninterval_seconds = ");

    let err = ConfigLoader::new(&base)
        .with_environment("test")
        .with_env_prefix("DOCSYNC_IT_MALFORMED")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::ParseError { .. }));
    Ok(())
}

#[test]
fn test_redis_backend_requires_url() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(
        &dir,
        "orchestration.toml",
        r#"
[coordination]
backend = "redis"

[coordination.redis]
url = " "
"#,
    );

    let err = ConfigLoader::new(&base)
        .with_environment("test")
        .with_env_prefix("DOCSYNC_IT_REDIS")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingRequiredField { .. }));
    Ok(())
}

#[test]
fn test_shipped_config_files_load() -> anyhow::Result<()> {
    let base = concat!(env!("CARGO_MANIFEST_DIR"), "/config/orchestration.toml");
    for environment in ["development", "test", "production"] {
        let config = ConfigLoader::new(base)
            .with_environment(environment)
            .with_env_prefix("DOCSYNC_IT_SHIPPED")
            .load()?;
        assert!(config.watchdog.liveness_ttl_seconds > config.watchdog.interval_seconds);
    }

    let test = ConfigLoader::new(base)
        .with_environment("test")
        .with_env_prefix("DOCSYNC_IT_SHIPPED")
        .load()?;
    assert_eq!(test.indexing.poll_interval_seconds, 1);
    assert_eq!(test.coordination.backend, CoordinationBackend::Memory);
    Ok(())
}
