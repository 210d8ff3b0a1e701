//! Connection settings and connection-mode resolution.
//!
//! Settings deserialize from JSON using either snake_case keys or the
//! upper-case keys ORM settings files use (`NAME`, `SYNC_URL`, ...).

use libsql_backend_core::{ConnectOptions, Error, Result};
use libsql_backend_sqlite::{is_memory_target, is_remote_target};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Environment variable consulted for a missing sync URL.
pub const ENV_DATABASE_URL: &str = "TURSO_DATABASE_URL";
/// Environment variable consulted for a missing auth token.
pub const ENV_AUTH_TOKEN: &str = "TURSO_AUTH_TOKEN";

/// Target used when none is configured.
pub const DEFAULT_TARGET: &str = ":memory:";

/// Schemes a test target must use to replace an in-memory target.
const TEST_TARGET_SCHEMES: &[&str] = &["libsql://", "wss://", "https://"];

/// How a connection reaches its data. Fixed for the life of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Pure in-process memory database
    InMemory,
    /// Direct connection to a remote primary
    RemoteOnly,
    /// Local replica file synchronized with a remote primary
    EmbeddedReplica,
    /// Plain local file, no remote primary
    LocalFile,
}

impl ConnectionMode {
    pub fn can_sync(self) -> bool {
        self == ConnectionMode::EmbeddedReplica
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionMode::InMemory => "in-memory",
            ConnectionMode::RemoteOnly => "remote-only",
            ConnectionMode::EmbeddedReplica => "embedded-replica",
            ConnectionMode::LocalFile => "local-file",
        };
        write!(f, "{}", name)
    }
}

/// Connection settings for one database alias.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Local path, memory target or remote URL
    #[serde(alias = "NAME")]
    pub target: Option<String>,
    /// Remote primary an embedded replica syncs against
    #[serde(alias = "SYNC_URL")]
    pub sync_url: Option<String>,
    #[serde(alias = "AUTH_TOKEN")]
    pub auth_token: Option<String>,
    /// Automatic sync interval in seconds
    #[serde(alias = "SYNC_INTERVAL")]
    pub sync_interval: Option<f64>,
    #[serde(alias = "ENCRYPTION_KEY")]
    pub encryption_key: Option<String>,
    /// Replaces an in-memory target when it names a remote database
    #[serde(alias = "TEST_NAME")]
    pub test_target: Option<String>,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("DatabaseSettings")
            .field("target", &self.target)
            .field("sync_url", &self.sync_url)
            .field("auth_token", &redact(&self.auth_token))
            .field("sync_interval", &self.sync_interval)
            .field("encryption_key", &redact(&self.encryption_key))
            .field("test_target", &self.test_target)
            .finish()
    }
}

impl DatabaseSettings {
    /// Settings for a pure in-memory database.
    pub fn memory() -> Self {
        Self::target(DEFAULT_TARGET)
    }

    /// Settings for a local file, remote URL or memory target.
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Settings for an embedded replica of `sync_url` stored at `path`.
    pub fn replica(path: impl Into<String>, sync_url: impl Into<String>) -> Self {
        Self::target(path).sync_url(sync_url)
    }

    pub fn sync_url(mut self, url: impl Into<String>) -> Self {
        self.sync_url = Some(url.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the automatic sync interval in (fractional) seconds.
    pub fn sync_interval(mut self, seconds: f64) -> Self {
        self.sync_interval = Some(seconds);
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn test_target(mut self, target: impl Into<String>) -> Self {
        self.test_target = Some(target.into());
        self
    }

    /// Parse settings from a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fill a missing sync URL and auth token from the process environment.
    pub fn with_env_fallback(self) -> Self {
        self.with_env_fallback_from(|key| std::env::var(key).ok())
    }

    /// Fill a missing sync URL and auth token through `lookup`.
    pub fn with_env_fallback_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !has_value(self.sync_url.as_deref()) {
            if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
                self.sync_url = Some(url);
            }
        }
        if !has_value(self.auth_token.as_deref()) {
            if let Some(token) = lookup(ENV_AUTH_TOKEN).filter(|v| !v.is_empty()) {
                self.auth_token = Some(token);
            }
        }
        self
    }

    /// Is a non-empty remote sync URL configured?
    pub fn has_sync_url(&self) -> bool {
        has_value(self.sync_url.as_deref())
    }

    /// The configured target with the test-target override applied.
    pub fn effective_target(&self) -> String {
        let target = self
            .target
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TARGET);

        if target == DEFAULT_TARGET {
            if let Some(test) = self.test_target.as_deref() {
                if TEST_TARGET_SCHEMES.iter().any(|s| test.starts_with(s)) {
                    tracing::debug!(test_target = %test, "test target replaces in-memory target");
                    return test.to_string();
                }
            }
        }
        target.to_string()
    }

    fn interval(&self) -> Result<Option<Duration>> {
        match self.sync_interval {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            Some(secs) => Err(Error::config(format!(
                "sync_interval must be a positive number of seconds, got {}",
                secs
            ))),
        }
    }

    /// Resolve these settings into a connection plan.
    pub fn resolve(&self) -> Result<ConnectionPlan> {
        let target = self.effective_target();

        if is_memory_target(&target) {
            if self.has_sync_url() {
                return Err(Error::config(format!(
                    "sync_url is set but the target {:?} is in-memory; embedded replicas need a local file path",
                    target
                )));
            }
            return Ok(ConnectionPlan {
                mode: ConnectionMode::InMemory,
                target: DEFAULT_TARGET.to_string(),
                options: ConnectOptions::new(),
            });
        }

        let interval = self.interval()?;

        if is_remote_target(&target) {
            let mut options = ConnectOptions::new();
            options.auth_token = self.auth_token.clone().filter(|t| !t.is_empty());
            options.sync_interval = interval;
            return Ok(ConnectionPlan {
                mode: ConnectionMode::RemoteOnly,
                target,
                options,
            });
        }

        let options = ConnectOptions {
            sync_url: self.sync_url.clone().filter(|u| !u.is_empty()),
            auth_token: self.auth_token.clone().filter(|t| !t.is_empty()),
            sync_interval: interval,
            encryption_key: self.encryption_key.clone().filter(|k| !k.is_empty()),
        };
        let mode = if options.sync_url.is_some() {
            ConnectionMode::EmbeddedReplica
        } else {
            ConnectionMode::LocalFile
        };
        Ok(ConnectionPlan {
            mode,
            target,
            options,
        })
    }
}

fn has_value(v: Option<&str>) -> bool {
    v.is_some_and(|s| !s.is_empty())
}

/// The outcome of resolving settings: what to open and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPlan {
    pub mode: ConnectionMode,
    /// Target handed to the native driver
    pub target: String,
    pub options: ConnectOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_is_memory() {
        let plan = DatabaseSettings::default().resolve().unwrap();
        assert_eq!(plan.mode, ConnectionMode::InMemory);
        assert_eq!(plan.target, ":memory:");
        assert!(plan.options.is_empty());
    }

    #[test]
    fn memory_variants_open_plain_memory() {
        for target in ["file::memory:", "file:memory", "file:db?mode=memory&cache=shared"] {
            let plan = DatabaseSettings::target(target)
                .auth_token("ignored")
                .resolve()
                .unwrap();
            assert_eq!(plan.mode, ConnectionMode::InMemory, "{target}");
            assert_eq!(plan.target, ":memory:");
            assert!(plan.options.is_empty());
        }
    }

    #[test]
    fn memory_with_sync_url_is_a_configuration_error() {
        let err = DatabaseSettings::memory()
            .sync_url("libsql://db.turso.io")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn remote_target_is_remote_only() {
        let plan = DatabaseSettings::target("libsql://db.turso.io")
            .auth_token("tok")
            .sync_interval(0.5)
            .sync_url("libsql://ignored.turso.io")
            .encryption_key("ignored")
            .resolve()
            .unwrap();
        assert_eq!(plan.mode, ConnectionMode::RemoteOnly);
        assert_eq!(plan.target, "libsql://db.turso.io");
        assert_eq!(plan.options.auth_token.as_deref(), Some("tok"));
        assert_eq!(plan.options.sync_interval, Some(Duration::from_millis(500)));
        assert_eq!(plan.options.sync_url, None);
        assert_eq!(plan.options.encryption_key, None);
    }

    #[test]
    fn local_path_with_sync_url_is_embedded_replica() {
        let plan = DatabaseSettings::replica("replica.db", "libsql://db.turso.io")
            .auth_token("tok")
            .sync_interval(2.0)
            .encryption_key("key")
            .resolve()
            .unwrap();
        assert_eq!(plan.mode, ConnectionMode::EmbeddedReplica);
        assert_eq!(plan.target, "replica.db");
        assert_eq!(plan.options.sync_url.as_deref(), Some("libsql://db.turso.io"));
        assert_eq!(plan.options.encryption_key.as_deref(), Some("key"));
        assert_eq!(plan.options.sync_interval, Some(Duration::from_secs(2)));
    }

    #[test]
    fn local_path_without_sync_url_is_local_file() {
        let plan = DatabaseSettings::target("app.db")
            .sync_url("")
            .resolve()
            .unwrap();
        assert_eq!(plan.mode, ConnectionMode::LocalFile);
        assert_eq!(plan.options.sync_url, None);
    }

    #[test]
    fn test_target_overrides_memory_only_for_remote_schemes() {
        let s = DatabaseSettings::memory().test_target("libsql://test.turso.io");
        assert_eq!(s.resolve().unwrap().mode, ConnectionMode::RemoteOnly);

        let s = DatabaseSettings::memory().test_target("test.db");
        assert_eq!(s.resolve().unwrap().mode, ConnectionMode::InMemory);

        let s = DatabaseSettings::target("app.db").test_target("libsql://test.turso.io");
        assert_eq!(s.effective_target(), "app.db");
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let err = DatabaseSettings::replica("r.db", "libsql://db.turso.io")
            .sync_interval(-1.0)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_fallback_fills_missing_values_only() {
        let lookup = |key: &str| match key {
            ENV_DATABASE_URL => Some("libsql://env.turso.io".to_string()),
            ENV_AUTH_TOKEN => Some("env-token".to_string()),
            _ => None,
        };

        let filled = DatabaseSettings::target("replica.db").with_env_fallback_from(lookup);
        assert_eq!(filled.sync_url.as_deref(), Some("libsql://env.turso.io"));
        assert_eq!(filled.auth_token.as_deref(), Some("env-token"));
        assert_eq!(filled.resolve().unwrap().mode, ConnectionMode::EmbeddedReplica);

        let kept = DatabaseSettings::replica("replica.db", "libsql://own.turso.io")
            .auth_token("own")
            .with_env_fallback_from(lookup);
        assert_eq!(kept.sync_url.as_deref(), Some("libsql://own.turso.io"));
        assert_eq!(kept.auth_token.as_deref(), Some("own"));
    }

    #[test]
    fn deserializes_upper_case_keys() {
        let settings = DatabaseSettings::from_json(
            r#"{"NAME": "replica.db", "SYNC_URL": "libsql://db.turso.io", "AUTH_TOKEN": "t", "SYNC_INTERVAL": 1.5}"#,
        )
        .unwrap();
        assert_eq!(settings.target.as_deref(), Some("replica.db"));
        assert_eq!(settings.sync_interval, Some(1.5));
        assert!(settings.has_sync_url());

        let snake = DatabaseSettings::from_json(r#"{"target": ":memory:"}"#).unwrap();
        assert_eq!(snake, DatabaseSettings::memory());
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = DatabaseSettings::replica("r.db", "libsql://db.turso.io")
            .auth_token("very-secret")
            .encryption_key("also-secret");
        let printed = format!("{:?}", s);
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("also-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
