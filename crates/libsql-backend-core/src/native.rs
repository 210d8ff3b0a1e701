//! Native driver traits.
//!
//! This module defines the boundary between the backend adapter and a native
//! libSQL driver:
//!
//! - [`NativeDriver`] - opens handles for a target and reports the engine version
//! - [`NativeConnection`] - one open handle: cursors, commit/rollback, autocommit, sync
//! - [`NativeCursor`] - DB-API style cursor over one handle
//!
//! Drivers report failures as [`NativeError`] text only; the adapter owns all
//! classification. Calls are synchronous and blocking.

use crate::error::NativeError;
use crate::params::Params;
use crate::row::Row;
use std::fmt;
use std::time::Duration;

/// Result type for native driver calls.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Options passed to [`NativeDriver::connect`].
///
/// Which options are populated depends on the connection mode the adapter
/// resolved: in-memory handles receive none, direct remote handles receive
/// the auth token and sync interval, embedded replicas receive everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    /// Remote primary URL an embedded replica syncs against
    pub sync_url: Option<String>,
    /// Bearer token for the remote primary
    pub auth_token: Option<String>,
    /// Interval for automatic background sync
    pub sync_interval: Option<Duration>,
    /// Encryption key for the local replica file
    pub encryption_key: Option<String>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote sync URL.
    pub fn sync_url(mut self, url: impl Into<String>) -> Self {
        self.sync_url = Some(url.into());
        self
    }

    /// Set the auth token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the background sync interval.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Set the local encryption key.
    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Engine version, decoded from the `MAJOR*1_000_000 + MINOR*1_000 + PATCH`
/// number SQLite-family engines report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Decode a version number such as `3045001`.
    pub const fn from_number(number: u32) -> Self {
        Self {
            major: number / 1_000_000,
            minor: (number / 1_000) % 1_000,
            patch: number % 1_000,
        }
    }

    pub const fn as_number(&self) -> u32 {
        self.major * 1_000_000 + self.minor * 1_000 + self.patch
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A native libSQL driver.
pub trait NativeDriver: Send + Sync {
    /// Open a handle for `target` (a local path, a memory target or a remote URL).
    fn connect(&self, target: &str, options: &ConnectOptions)
    -> NativeResult<Box<dyn NativeConnection>>;

    /// Version of the storage engine behind this driver.
    fn engine_version(&self) -> EngineVersion;
}

/// One open native handle.
///
/// Handles are owned by exactly one adapter connection and are never shared
/// between workers, so only `Send` is required.
pub trait NativeConnection: Send {
    /// Create a cursor bound to this handle.
    fn cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>>;

    /// Commit the open transaction, if any.
    fn commit(&mut self) -> NativeResult<()>;

    /// Roll back the open transaction, if any.
    fn rollback(&mut self) -> NativeResult<()>;

    /// Release the handle. Further calls fail.
    fn close(&mut self) -> NativeResult<()>;

    fn autocommit(&self) -> bool;

    /// With autocommit off the driver opens an implicit transaction before
    /// the first data-modifying statement.
    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()>;

    /// Is an explicit or implicit transaction open?
    fn in_transaction(&self) -> bool;

    /// Pull the remote primary's committed state into the local replica.
    ///
    /// Handles that are not embedded replicas fail with a message stating
    /// the mode they were opened in.
    fn sync(&mut self) -> NativeResult<()>;
}

/// Cursor over a native handle.
pub trait NativeCursor: Send {
    /// Execute one statement with native placeholders (`?` or `:name`).
    fn execute(&mut self, sql: &str, params: &Params) -> NativeResult<()>;

    /// Execute one statement once per parameter set.
    fn executemany(&mut self, sql: &str, batches: &[Params]) -> NativeResult<()>;

    fn fetchone(&mut self) -> NativeResult<Option<Row>>;

    /// Fetch up to `size` rows, or the cursor's array size when `None`.
    fn fetchmany(&mut self, size: Option<usize>) -> NativeResult<Vec<Row>>;

    fn fetchall(&mut self) -> NativeResult<Vec<Row>>;

    /// Rows modified by the last statement, `-1` when not applicable.
    fn rowcount(&self) -> i64;

    fn lastrowid(&self) -> Option<i64>;

    /// Column names of the current result set.
    fn description(&self) -> Option<Vec<String>>;

    fn close(&mut self) -> NativeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_version_decoding() {
        let v = EngineVersion::from_number(3_045_001);
        assert_eq!(v, EngineVersion::new(3, 45, 1));
        assert_eq!(v.as_number(), 3_045_001);
        assert_eq!(v.to_string(), "3.45.1");
        assert!(v >= EngineVersion::new(3, 35, 0));
        assert!(EngineVersion::new(3, 34, 9) < EngineVersion::new(3, 35, 0));
    }

    #[test]
    fn connect_options_builder() {
        assert!(ConnectOptions::new().is_empty());
        let opts = ConnectOptions::new()
            .sync_url("libsql://db.example.turso.io")
            .auth_token("secret")
            .sync_interval(Duration::from_millis(1500));
        assert!(!opts.is_empty());
        assert_eq!(opts.sync_url.as_deref(), Some("libsql://db.example.turso.io"));
        assert_eq!(opts.sync_interval, Some(Duration::from_millis(1500)));
        assert_eq!(opts.encryption_key, None);
    }
}
