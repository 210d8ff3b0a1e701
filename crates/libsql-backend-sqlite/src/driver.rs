//! [`SqliteDriver`]: the native driver entry point.
//!
//! Remote primaries are SQLite files registered under a remote URL
//! (`libsql://...`, `https://...`). Connecting to a registered URL opens the
//! primary directly; connecting to a local path with a `sync_url` opens an
//! embedded replica of that primary.

use crate::connection::{SqliteConfig, SqliteHandle};
use crate::cursor::SqliteCursor;
use crate::session::{Session, Storage};
use crate::sync::SyncTimer;
use libsql_backend_core::{
    ConnectOptions, EngineVersion, NativeConnection, NativeCursor, NativeDriver, NativeError,
    NativeResult,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// URL schemes that address a remote primary.
pub const REMOTE_SCHEMES: &[&str] = &["libsql://", "wss://", "ws://", "https://", "http://"];

/// Is `target` a pure in-memory database name?
pub fn is_memory_target(target: &str) -> bool {
    target == ":memory:"
        || target.starts_with("file::memory:")
        || target.starts_with("file:memory")
        || target.contains("mode=memory")
}

/// Does `target` address a remote primary?
pub fn is_remote_target(target: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| target.starts_with(scheme))
}

#[derive(Debug)]
struct Primary {
    path: PathBuf,
    auth_token: Option<String>,
    online: Arc<AtomicBool>,
}

/// Reachability of one registered primary, shared by every handle using it.
#[derive(Debug, Clone)]
pub(crate) struct PrimaryLink {
    url: String,
    online: Arc<AtomicBool>,
}

impl PrimaryLink {
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Fail the way a dropped remote stream does when the primary is offline.
    pub(crate) fn check(&self) -> NativeResult<()> {
        if self.online.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NativeError::new(format!(
                "Hrana: stream not found: primary {} closed the stream",
                self.url
            )))
        }
    }
}

/// SQLite-backed native driver.
///
/// Cloning is cheap; clones share the primary registry.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    primaries: Arc<RwLock<HashMap<String, Primary>>>,
    busy_timeout_ms: u32,
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self {
            primaries: Arc::new(RwLock::new(HashMap::new())),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primary without an auth requirement.
    pub fn with_primary(self, url: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.register_primary(url, path, None);
        self
    }

    /// Set busy timeout for every handle this driver opens.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Register (or replace) the primary served at `url`.
    ///
    /// When `auth_token` is set, connections must present the same token.
    pub fn register_primary(
        &self,
        url: impl Into<String>,
        path: impl AsRef<Path>,
        auth_token: Option<String>,
    ) {
        let url = url.into();
        tracing::debug!(url = %url, path = %path.as_ref().display(), "registered primary");
        self.primaries.write().insert(
            url,
            Primary {
                path: path.as_ref().to_path_buf(),
                auth_token,
                online: Arc::new(AtomicBool::new(true)),
            },
        );
    }

    /// Take a primary offline or bring it back. Handles using an offline
    /// primary fail with a stream-loss error.
    pub fn set_primary_online(&self, url: &str, online: bool) {
        if let Some(primary) = self.primaries.read().get(url) {
            primary.online.store(online, Ordering::Release);
            tracing::debug!(url, online, "primary availability changed");
        }
    }

    fn config(&self, path: impl Into<String>) -> SqliteConfig {
        SqliteConfig::file(path).busy_timeout(self.busy_timeout_ms)
    }

    fn open_primary(
        &self,
        url: &str,
        auth_token: Option<&str>,
    ) -> NativeResult<(SqliteHandle, PrimaryLink)> {
        let primaries = self.primaries.read();
        let primary = primaries.get(url).ok_or_else(|| {
            NativeError::new(format!("Hrana: failed to connect to {}: unknown primary", url))
        })?;

        if let Some(expected) = &primary.auth_token {
            if auth_token != Some(expected.as_str()) {
                return Err(NativeError::new(format!(
                    "authentication failed for {}: invalid or missing auth token",
                    url
                )));
            }
        }

        let link = PrimaryLink {
            url: url.to_string(),
            online: Arc::clone(&primary.online),
        };
        link.check()?;

        let handle = SqliteHandle::open(&self.config(primary.path.to_string_lossy()))?;
        Ok((handle, link))
    }
}

fn reject_encryption(options: &ConnectOptions) -> NativeResult<()> {
    if options.encryption_key.is_some() {
        return Err(NativeError::new(
            "encryption_key requires an engine built with encryption at rest",
        ));
    }
    Ok(())
}

impl NativeDriver for SqliteDriver {
    fn connect(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> NativeResult<Box<dyn NativeConnection>> {
        let storage = if is_memory_target(target) {
            Storage::Memory(SqliteHandle::open(
                &SqliteConfig::memory().busy_timeout(self.busy_timeout_ms),
            )?)
        } else if is_remote_target(target) {
            let (primary, link) = self.open_primary(target, options.auth_token.as_deref())?;
            Storage::Remote { primary, link }
        } else if let Some(sync_url) = options.sync_url.as_deref() {
            reject_encryption(options)?;
            let (primary, link) = self.open_primary(sync_url, options.auth_token.as_deref())?;
            let local = SqliteHandle::open(&self.config(target))?;
            local.copy_from(&primary)?;
            Storage::Replica {
                local,
                primary,
                link,
            }
        } else {
            reject_encryption(options)?;
            Storage::Local(SqliteHandle::open(&self.config(target))?)
        };

        let mode = storage.mode_name();
        let session = Arc::new(Mutex::new(Session::new(storage)));

        let timer = match (mode, options.sync_interval) {
            ("Replica", Some(interval)) => {
                let weak = Arc::downgrade(&session);
                let timer = SyncTimer::start(interval, move || {
                    let Some(session) = weak.upgrade() else {
                        return false;
                    };
                    let mut session = session.lock();
                    if session.is_closed() {
                        return false;
                    }
                    if let Err(e) = session.sync() {
                        tracing::warn!(error = %e, "background replica sync failed");
                    }
                    true
                })
                .map_err(|e| NativeError::new(format!("failed to start sync timer: {}", e)))?;
                Some(timer)
            }
            _ => None,
        };

        tracing::debug!(database = %target, mode, "native connection opened");
        Ok(Box::new(SqliteNativeConnection { session, timer }))
    }

    fn engine_version(&self) -> EngineVersion {
        EngineVersion::from_number(u32::try_from(crate::ffi::version_number()).unwrap_or(0))
    }
}

/// One native handle produced by [`SqliteDriver`].
pub struct SqliteNativeConnection {
    session: Arc<Mutex<Session>>,
    timer: Option<SyncTimer>,
}

impl SqliteNativeConnection {
    /// Is a background sync timer attached?
    pub fn has_sync_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(SyncTimer::is_running)
    }
}

impl NativeConnection for SqliteNativeConnection {
    fn cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        if self.session.lock().is_closed() {
            return Err(NativeError::new("Cannot operate on a closed database."));
        }
        Ok(Box::new(SqliteCursor::new(Arc::clone(&self.session))))
    }

    fn commit(&mut self) -> NativeResult<()> {
        self.session.lock().commit()
    }

    fn rollback(&mut self) -> NativeResult<()> {
        self.session.lock().rollback()
    }

    fn close(&mut self) -> NativeResult<()> {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
        self.session.lock().close();
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.session.lock().autocommit()
    }

    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()> {
        self.session.lock().set_autocommit(autocommit)
    }

    fn in_transaction(&self) -> bool {
        self.session.lock().in_transaction()
    }

    fn sync(&mut self) -> NativeResult<()> {
        self.session.lock().sync()
    }
}

impl Drop for SqliteNativeConnection {
    fn drop(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_classification() {
        assert!(is_memory_target(":memory:"));
        assert!(is_memory_target("file::memory:?cache=shared"));
        assert!(is_memory_target("file:memdb1?mode=memory&cache=shared"));
        assert!(!is_memory_target("replica.db"));

        for url in [
            "libsql://db.turso.io",
            "wss://db.turso.io",
            "ws://localhost:8080",
            "https://db.turso.io",
            "http://127.0.0.1:8080",
        ] {
            assert!(is_remote_target(url), "{url}");
        }
        assert!(!is_remote_target("/var/data/replica.db"));
    }

    #[test]
    fn unknown_primary_is_rejected() {
        let driver = SqliteDriver::new();
        let err = driver
            .connect("libsql://nowhere.turso.io", &ConnectOptions::new())
            .err()
            .unwrap();
        assert!(err.message.contains("unknown primary"));
    }

    #[test]
    fn auth_token_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new();
        driver.register_primary(
            "libsql://secure.turso.io",
            dir.path().join("primary.db"),
            Some("s3cret".to_string()),
        );

        assert!(
            driver
                .connect("libsql://secure.turso.io", &ConnectOptions::new())
                .is_err()
        );
        assert!(
            driver
                .connect(
                    "libsql://secure.turso.io",
                    &ConnectOptions::new().auth_token("s3cret")
                )
                .is_ok()
        );
    }

    #[test]
    fn encryption_key_is_rejected_for_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("local.db");
        let err = SqliteDriver::new()
            .connect(
                &target.to_string_lossy(),
                &ConnectOptions::new().encryption_key("k"),
            )
            .err()
            .unwrap();
        assert!(err.message.contains("encryption"));
    }

    #[test]
    fn engine_version_matches_library() {
        let version = SqliteDriver::new().engine_version();
        assert_eq!(version.major, 3);
        assert_eq!(
            i64::from(version.as_number()),
            i64::from(crate::ffi::version_number())
        );
    }
}
