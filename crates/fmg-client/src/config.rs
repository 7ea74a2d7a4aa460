//! Client settings with YAML, TOML and environment support

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::protocol::StatusKind;

/// Immutable settings for one [`FmgClient`](crate::FmgClient).
///
/// Can be loaded from YAML, TOML, the process environment, or constructed
/// programmatically through [`ClientSettings::builder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Where the appliance lives
    pub connection: ConnectionSettings,

    /// How to authenticate
    pub credentials: Credentials,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Task polling defaults
    #[serde(default)]
    pub tasks: TaskPollSettings,

    /// ADOM used when an operation does not name one
    #[serde(default = "default_adom")]
    pub default_adom: String,

    #[serde(default)]
    pub tool_mode: ExposureMode,

    /// Per-deployment remote status code overrides
    #[serde(default)]
    pub status_overrides: HashMap<i64, StatusKind>,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Hostname, or a full `http(s)://host:port` URL
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Verify the appliance certificate (default: true)
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

/// Authentication material
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Credentials {
    /// API token sent as a bearer header on every request
    Token { token: String },
    /// Username/password exchanged for a session id at login
    Password { username: String, password: String },
}

impl Credentials {
    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::Token { .. } => "token",
            Credentials::Password { .. } => "password",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token { .. } => f
                .debug_struct("Token")
                .field("token", &crate::sanitize::REDACTED)
                .finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &crate::sanitize::REDACTED)
                .finish(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Per-attempt request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// Connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

/// Backoff shape between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// First backoff delay in milliseconds (default: 200ms)
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff cap in milliseconds (default: 5s)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Task polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPollSettings {
    /// Poll interval in milliseconds (default: 2s)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Overall wait deadline in milliseconds (default: 5 minutes)
    #[serde(default = "default_poll_deadline")]
    pub deadline_ms: u64,
}

impl Default for TaskPollSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            deadline_ms: default_poll_deadline(),
        }
    }
}

/// How operations are exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    /// Every operation is its own tool
    #[default]
    Full,
    /// Only discovery and execute meta tools; calls go through the dispatcher
    Dynamic,
}

impl std::str::FromStr for ExposureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ExposureMode::Full),
            "dynamic" => Ok(ExposureMode::Dynamic),
            _ => Err(ConfigError::Invalid(
                "tool mode must be 'full' or 'dynamic'".to_string(),
            )),
        }
    }
}

fn default_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_adom() -> String {
    "root".to_string()
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    5_000
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_poll_deadline() -> u64 {
    300_000 // 5 minutes
}

/// Environment variable names read by [`ClientSettings::from_env`]
pub mod env {
    pub const HOST: &str = "FORTIMANAGER_HOST";
    pub const PORT: &str = "FORTIMANAGER_PORT";
    pub const API_TOKEN: &str = "FORTIMANAGER_API_TOKEN";
    pub const USERNAME: &str = "FORTIMANAGER_USERNAME";
    pub const PASSWORD: &str = "FORTIMANAGER_PASSWORD";
    pub const VERIFY_SSL: &str = "FORTIMANAGER_VERIFY_SSL";
    pub const TIMEOUT: &str = "FORTIMANAGER_TIMEOUT";
    pub const MAX_RETRIES: &str = "FORTIMANAGER_MAX_RETRIES";
    pub const DEFAULT_ADOM: &str = "FMG_DEFAULT_ADOM";
    pub const TOOL_MODE: &str = "FMG_TOOL_MODE";
}

impl ClientSettings {
    /// Load settings from a file; `.toml` files are parsed as TOML, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Build settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// A token takes precedence over username/password when both are present.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get(env::HOST).ok_or(ConfigError::Missing(env::HOST))?;

        let credentials = match (get(env::API_TOKEN), get(env::USERNAME), get(env::PASSWORD)) {
            (Some(token), _, _) => Credentials::Token { token },
            (None, Some(username), Some(password)) => Credentials::Password { username, password },
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "set {} or both {} and {}",
                    env::API_TOKEN,
                    env::USERNAME,
                    env::PASSWORD
                )))
            }
        };

        let mut builder = Self::builder(host).credentials(credentials);

        if let Some(port) = get(env::PORT) {
            builder = builder.port(parse_var(env::PORT, &port)?);
        }
        if let Some(verify) = get(env::VERIFY_SSL) {
            builder = builder.verify_tls(parse_bool(env::VERIFY_SSL, &verify)?);
        }
        if let Some(timeout) = get(env::TIMEOUT) {
            let secs: u64 = parse_var(env::TIMEOUT, &timeout)?;
            builder = builder.request_timeout_ms(secs * 1000);
        }
        if let Some(retries) = get(env::MAX_RETRIES) {
            builder = builder.max_attempts(parse_var(env::MAX_RETRIES, &retries)?);
        }
        if let Some(adom) = get(env::DEFAULT_ADOM) {
            builder = builder.default_adom(adom);
        }
        if let Some(mode) = get(env::TOOL_MODE) {
            builder = builder.tool_mode(mode.parse()?);
        }

        builder.build()
    }

    /// Create a builder for programmatic configuration
    pub fn builder(host: impl Into<String>) -> ClientSettingsBuilder {
        ClientSettingsBuilder::new(host)
    }

    /// Base URL of the appliance.
    ///
    /// A host given with an explicit scheme is used as-is; a bare hostname
    /// becomes `https://host:port`.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let host = self.connection.host.trim().trim_end_matches('/');
        let raw = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}:{}", host, self.connection.port)
        };
        Url::parse(&raw).map_err(|e| ConfigError::Invalid(format!("invalid host: {}", e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.connect_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.tasks.interval_ms)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_millis(self.tasks.deadline_ms)
    }

    /// Check settings for values the client cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        self.base_url()?;

        match &self.credentials {
            Credentials::Token { token } if token.trim().is_empty() => {
                return Err(ConfigError::Invalid("API token must not be empty".to_string()))
            }
            Credentials::Password { username, password }
                if username.trim().is_empty() || password.is_empty() =>
            {
                return Err(ConfigError::Invalid(
                    "username and password must not be empty".to_string(),
                ))
            }
            _ => {}
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeouts.request_ms == 0 || self.tasks.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts and poll interval must be non-zero".to_string(),
            ));
        }
        crate::validate::validate_adom(&self.default_adom)
            .map_err(|e| ConfigError::Invalid(format!("default_adom: {}", e)))?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} is not a valid number", name)))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{} must be true or false", name))),
    }
}

/// Builder for ClientSettings
pub struct ClientSettingsBuilder {
    settings: ClientSettings,
}

impl ClientSettingsBuilder {
    /// Create a new builder for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            settings: ClientSettings {
                connection: ConnectionSettings {
                    host: host.into(),
                    port: default_port(),
                    verify_tls: true,
                },
                credentials: Credentials::Token {
                    token: String::new(),
                },
                timeouts: TimeoutSettings::default(),
                retry: RetrySettings::default(),
                tasks: TaskPollSettings::default(),
                default_adom: default_adom(),
                tool_mode: ExposureMode::default(),
                status_overrides: HashMap::new(),
            },
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.settings.credentials = credentials;
        self
    }

    /// Authenticate with an API token
    pub fn token(self, token: impl Into<String>) -> Self {
        self.credentials(Credentials::Token {
            token: token.into(),
        })
    }

    /// Authenticate with username and password
    pub fn password(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials(Credentials::Password {
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.connection.port = port;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.settings.connection.verify_tls = verify;
        self
    }

    /// Set per-attempt request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.settings.timeouts.request_ms = ms;
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.settings.timeouts.connect_ms = ms;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.settings.retry.max_attempts = attempts;
        self
    }

    /// Set backoff shape and bounds in milliseconds
    pub fn backoff(mut self, kind: BackoffKind, base_ms: u64, max_ms: u64) -> Self {
        self.settings.retry.backoff = kind;
        self.settings.retry.base_delay_ms = base_ms;
        self.settings.retry.max_delay_ms = max_ms;
        self
    }

    /// Set task poll interval and deadline in milliseconds
    pub fn task_poll(mut self, interval_ms: u64, deadline_ms: u64) -> Self {
        self.settings.tasks.interval_ms = interval_ms;
        self.settings.tasks.deadline_ms = deadline_ms;
        self
    }

    pub fn default_adom(mut self, adom: impl Into<String>) -> Self {
        self.settings.default_adom = adom.into();
        self
    }

    pub fn tool_mode(mut self, mode: ExposureMode) -> Self {
        self.settings.tool_mode = mode;
        self
    }

    /// Override the classification of one remote status code
    pub fn status_override(mut self, code: i64, kind: StatusKind) -> Self {
        self.settings.status_overrides.insert(code, kind);
        self
    }

    /// Validate and build the settings
    pub fn build(self) -> Result<ClientSettings, ConfigError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
connection:
  host: "fmg.example.net"
  verify_tls: false

credentials:
  mode: password
  username: admin
  password: "s3cret"

retry:
  max_attempts: 5
  backoff: fixed

tasks:
  interval_ms: 500

status_overrides:
  -20: permission_denied
"#;

        let settings = ClientSettings::from_yaml(yaml).unwrap();
        assert_eq!(settings.connection.port, 443);
        assert!(!settings.connection.verify_tls);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.backoff, BackoffKind::Fixed);
        assert_eq!(settings.tasks.interval_ms, 500);
        assert_eq!(settings.tasks.deadline_ms, 300_000);
        assert_eq!(settings.default_adom, "root");
        assert_eq!(
            settings.status_overrides.get(&-20),
            Some(&StatusKind::PermissionDenied)
        );
        assert_eq!(
            settings.base_url().unwrap().as_str(),
            "https://fmg.example.net/"
        );
    }

    #[test]
    fn test_toml_parsing() {
        let text = r#"
default_adom = "branch"
tool_mode = "dynamic"

[connection]
host = "10.0.0.5"
port = 8443

[credentials]
mode = "token"
token = "abcdef"
"#;
        let settings = ClientSettings::from_toml(text).unwrap();
        assert_eq!(settings.tool_mode, ExposureMode::Dynamic);
        assert_eq!(
            settings.base_url().unwrap().as_str(),
            "https://10.0.0.5:8443/"
        );
    }

    #[test]
    fn test_builder() {
        let settings = ClientSettings::builder("http://127.0.0.1:9000")
            .token("tok")
            .max_attempts(2)
            .backoff(BackoffKind::Exponential, 10, 100)
            .task_poll(50, 1_000)
            .build()
            .unwrap();

        assert_eq!(settings.base_url().unwrap().as_str(), "http://127.0.0.1:9000/");
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.poll_interval(), Duration::from_millis(50));
        assert_eq!(settings.credentials.mode(), "token");
    }

    #[test]
    fn test_validation_failures() {
        assert!(ClientSettings::builder("fmg").build().is_err());
        assert!(ClientSettings::builder("").token("t").build().is_err());
        assert!(ClientSettings::builder("fmg")
            .token("t")
            .max_attempts(0)
            .build()
            .is_err());
        assert!(ClientSettings::builder("fmg")
            .password("admin", "")
            .build()
            .is_err());
        assert!(ClientSettings::builder("fmg")
            .token("t")
            .default_adom("bad/adom")
            .build()
            .is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            (env::HOST, "fmg.lab"),
            (env::USERNAME, "admin"),
            (env::PASSWORD, "pw"),
            (env::VERIFY_SSL, "false"),
            (env::TIMEOUT, "12"),
            (env::MAX_RETRIES, "4"),
            (env::TOOL_MODE, "dynamic"),
        ]);
        let settings =
            ClientSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.credentials.mode(), "password");
        assert!(!settings.connection.verify_tls);
        assert_eq!(settings.timeouts.request_ms, 12_000);
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.tool_mode, ExposureMode::Dynamic);
    }

    #[test]
    fn test_from_lookup_requires_credentials() {
        let err = ClientSettings::from_lookup(|k| {
            (k == env::HOST).then(|| "fmg.lab".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ClientSettings::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(env::HOST)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::Password {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let out = format!("{:?}", creds);
        assert!(out.contains("admin"));
        assert!(!out.contains("hunter2"));
    }
}
