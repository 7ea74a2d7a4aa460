//! Settings loading from files and the process environment

use std::io::Write;

use fmg_client::config::{env, BackoffKind};
use fmg_client::{ClientSettings, ConfigError, Credentials, ExposureMode, StatusKind};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::NamedTempFile;

const ALL_VARS: [&str; 10] = [
    env::HOST,
    env::PORT,
    env::API_TOKEN,
    env::USERNAME,
    env::PASSWORD,
    env::VERIFY_SSL,
    env::TIMEOUT,
    env::MAX_RETRIES,
    env::DEFAULT_ADOM,
    env::TOOL_MODE,
];

fn clear_env() {
    for var in ALL_VARS {
        std::env::remove_var(var);
    }
}

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_file() {
    let file = write_temp(
        ".yaml",
        r#"
connection:
  host: fmg.lab.local
  verify_tls: false
credentials:
  mode: password
  username: admin
  password: s3cret
retry:
  max_attempts: 5
  backoff: fixed
default_adom: lab
status_overrides:
  -20: lock_conflict
"#,
    );

    let settings = ClientSettings::from_file(file.path()).unwrap();
    assert_eq!(settings.connection.host, "fmg.lab.local");
    assert_eq!(settings.connection.port, 443);
    assert!(!settings.connection.verify_tls);
    assert_eq!(
        settings.credentials,
        Credentials::Password {
            username: "admin".to_string(),
            password: "s3cret".to_string(),
        }
    );
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(settings.retry.backoff, BackoffKind::Fixed);
    assert_eq!(settings.default_adom, "lab");
    assert_eq!(
        settings.status_overrides.get(&-20),
        Some(&StatusKind::LockConflict)
    );
    assert_eq!(
        settings.base_url().unwrap().as_str(),
        "https://fmg.lab.local:443/"
    );
}

#[test]
fn test_toml_file() {
    let file = write_temp(
        ".toml",
        r#"
default_adom = "root"
tool_mode = "dynamic"

[connection]
host = "https://10.0.0.5:8443"

[credentials]
mode = "token"
token = "abc123"

[timeouts]
request_ms = 15000

[tasks]
interval_ms = 500
deadline_ms = 60000
"#,
    );

    let settings = ClientSettings::from_file(file.path()).unwrap();
    assert_eq!(settings.tool_mode, ExposureMode::Dynamic);
    assert_eq!(settings.credentials.mode(), "token");
    assert_eq!(settings.timeouts.request_ms, 15_000);
    assert_eq!(settings.timeouts.connect_ms, 10_000);
    assert_eq!(settings.tasks.interval_ms, 500);
    assert_eq!(
        settings.base_url().unwrap().as_str(),
        "https://10.0.0.5:8443/"
    );
}

#[test]
fn test_missing_file() {
    let err = ClientSettings::from_file("/nonexistent/fmgctl.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_invalid_file_content() {
    let file = write_temp(
        ".yaml",
        r#"
connection:
  host: fmg.lab.local
credentials:
  mode: token
  token: ""
"#,
    );
    let err = ClientSettings::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_yaml_roundtrip_keeps_secrets_out_of_debug() {
    let settings = ClientSettings::builder("fmg.lab.local")
        .password("admin", "hunter2")
        .build()
        .unwrap();

    let yaml = settings.to_yaml().unwrap();
    let parsed = ClientSettings::from_yaml(&yaml).unwrap();
    assert_eq!(parsed.credentials, settings.credentials);
    assert!(!format!("{:?}", parsed).contains("hunter2"));
}

#[test]
#[serial]
fn test_from_env_token() {
    clear_env();
    std::env::set_var(env::HOST, "fmg.lab.local");
    std::env::set_var(env::API_TOKEN, "envtoken");
    std::env::set_var(env::USERNAME, "admin");
    std::env::set_var(env::PASSWORD, "ignored");
    std::env::set_var(env::TIMEOUT, "45");
    std::env::set_var(env::VERIFY_SSL, "false");
    std::env::set_var(env::TOOL_MODE, "dynamic");

    let settings = ClientSettings::from_env().unwrap();
    clear_env();

    assert_eq!(
        settings.credentials,
        Credentials::Token {
            token: "envtoken".to_string()
        }
    );
    assert_eq!(settings.timeouts.request_ms, 45_000);
    assert!(!settings.connection.verify_tls);
    assert_eq!(settings.tool_mode, ExposureMode::Dynamic);
}

#[test]
#[serial]
fn test_from_env_password() {
    clear_env();
    std::env::set_var(env::HOST, "fmg.lab.local");
    std::env::set_var(env::USERNAME, "admin");
    std::env::set_var(env::PASSWORD, "s3cret");
    std::env::set_var(env::PORT, "8443");
    std::env::set_var(env::DEFAULT_ADOM, "lab");

    let settings = ClientSettings::from_env().unwrap();
    clear_env();

    assert_eq!(settings.credentials.mode(), "password");
    assert_eq!(settings.connection.port, 8443);
    assert_eq!(settings.default_adom, "lab");
}

#[test]
#[serial]
fn test_from_env_requires_credentials() {
    clear_env();
    std::env::set_var(env::HOST, "fmg.lab.local");
    std::env::set_var(env::USERNAME, "admin");

    let err = ClientSettings::from_env().unwrap_err();
    clear_env();

    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
#[serial]
fn test_from_env_requires_host() {
    clear_env();
    let err = ClientSettings::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Missing(env::HOST)));
}
