//! Connection management and the transaction/autocommit controller.
//!
//! A [`ConnectionManager`] holds resolved settings and a native driver. It
//! is cheap to clone and is shared between workers; each worker opens its
//! own [`LibsqlConnection`]. Connections are `Send` but not `Sync` and are
//! never shared.
//!
//! # Example
//!
//! ```rust,ignore
//! use libsql_backend::{ConnectionManager, DatabaseSettings};
//! use libsql_backend_core::Params;
//!
//! let manager = ConnectionManager::sqlite(DatabaseSettings::memory())?;
//! let mut conn = manager.open();
//! let mut cur = conn.cursor()?;
//! cur.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", &Params::None)?;
//! cur.execute("INSERT INTO items (name) VALUES (%s)", &Params::positional(["r1"]))?;
//! ```

use crate::config::{ConnectionMode, ConnectionPlan, DatabaseSettings};
use crate::cursor::Cursor;
use crate::errors::{NativeErrorClass, classify, translate_native_error};
use crate::features::DatabaseFeatures;
use crate::operations::DatabaseOperations;
use crate::schema::SchemaEditor;
use libsql_backend_core::{
    Error, IntegrityError, NativeConnection, NativeDriver, NativeError, OperationalError,
    OperationalErrorKind, Params, Result,
};
use libsql_backend_sqlite::SqliteDriver;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message for `sync()` on a connection that has no local replica.
pub const SYNC_REPLICA_ONLY: &str = "Manual sync is only available for embedded replica connections. Ensure you have configured both NAME (local file) and SYNC_URL.";

/// Message for `sync()` on an in-memory connection.
pub const SYNC_NOT_IN_MEMORY: &str = "Manual sync is not available for in-memory databases. Ensure NAME points to a file path, not ':memory:'.";

/// Shared factory for per-worker connections.
#[derive(Clone)]
pub struct ConnectionManager {
    driver: Arc<dyn NativeDriver>,
    settings: DatabaseSettings,
    plan: ConnectionPlan,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.settings)
            .field("mode", &self.plan.mode)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager over `driver`. Settings are validated here.
    pub fn new(driver: Arc<dyn NativeDriver>, settings: DatabaseSettings) -> Result<Self> {
        let plan = settings.resolve()?;
        tracing::debug!(
            mode = %plan.mode,
            database = %plan.target,
            "resolved connection mode"
        );
        Ok(Self {
            driver,
            settings,
            plan,
        })
    }

    /// Create a manager backed by the bundled SQLite driver.
    pub fn sqlite(settings: DatabaseSettings) -> Result<Self> {
        Self::new(Arc::new(SqliteDriver::new()), settings)
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn mode(&self) -> ConnectionMode {
        self.plan.mode
    }

    pub fn driver(&self) -> &Arc<dyn NativeDriver> {
        &self.driver
    }

    /// Create a connection. The native handle is opened on first use.
    pub fn open(&self) -> LibsqlConnection {
        LibsqlConnection {
            driver: Arc::clone(&self.driver),
            settings: self.settings.clone(),
            plan: self.plan.clone(),
            native: None,
            autocommit: true,
            in_atomic_block: false,
            needs_rollback: false,
        }
    }

    /// Create a connection and open its native handle now.
    pub fn connect(&self) -> Result<LibsqlConnection> {
        let mut conn = self.open();
        conn.connect()?;
        Ok(conn)
    }
}

/// Result of a successful manual sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub duration: Duration,
}

/// One worker's connection to the database.
pub struct LibsqlConnection {
    driver: Arc<dyn NativeDriver>,
    settings: DatabaseSettings,
    plan: ConnectionPlan,
    native: Option<Box<dyn NativeConnection>>,
    autocommit: bool,
    in_atomic_block: bool,
    needs_rollback: bool,
}

impl std::fmt::Debug for LibsqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibsqlConnection")
            .field("mode", &self.plan.mode)
            .field("target", &self.plan.target)
            .field("connected", &self.native.is_some())
            .field("autocommit", &self.autocommit)
            .field("in_atomic_block", &self.in_atomic_block)
            .finish_non_exhaustive()
    }
}

impl LibsqlConnection {
    pub fn mode(&self) -> ConnectionMode {
        self.plan.mode
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Replace the settings. Closes the native handle; the next operation
    /// reconnects with the new settings.
    pub fn update_settings(&mut self, settings: DatabaseSettings) -> Result<()> {
        let plan = settings.resolve()?;
        self.close()?;
        self.settings = settings;
        self.plan = plan;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.native.is_some()
    }

    /// Is this an in-memory database?
    pub fn is_in_memory_db(&self) -> bool {
        self.plan.mode == ConnectionMode::InMemory
    }

    pub fn in_atomic_block(&self) -> bool {
        self.in_atomic_block
    }

    pub fn needs_rollback(&self) -> bool {
        self.needs_rollback
    }

    /// Mark the enclosing atomic block for rollback.
    pub fn set_rollback(&mut self, rollback: bool) {
        self.needs_rollback = rollback;
    }

    /// Open the native handle if it is not open yet.
    pub fn connect(&mut self) -> Result<()> {
        if self.native.is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let mut native = self
            .driver
            .connect(&self.plan.target, &self.plan.options)
            .map_err(|e| translate_native_error(e, None))?;
        native
            .set_autocommit(true)
            .map_err(|e| translate_native_error(e, None))?;

        self.native = Some(native);
        self.autocommit = true;
        self.in_atomic_block = false;
        self.needs_rollback = false;

        tracing::info!(
            mode = %self.plan.mode,
            database = %self.plan.target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "libsql connection opened"
        );
        Ok(())
    }

    fn native(&mut self) -> Result<&mut dyn NativeConnection> {
        self.connect()?;
        match self.native.as_deref_mut() {
            Some(native) => Ok(native),
            None => Err(Error::operational(
                OperationalErrorKind::ConnectionLost,
                "No database connection available",
            )),
        }
    }

    /// Translate a native failure; on stream loss close this connection
    /// before the error is handed back.
    pub(crate) fn handle_native_error(&mut self, err: NativeError, sql: Option<&str>) -> Error {
        let error = translate_native_error(err, sql);
        if error.is_connection_lost() {
            tracing::warn!(
                mode = %self.plan.mode,
                error = %error,
                "remote stream lost, closing connection"
            );
            self.discard();
        }
        error
    }

    /// Drop the native handle without surfacing close failures.
    fn discard(&mut self) {
        if let Some(mut native) = self.native.take() {
            if let Err(e) = native.close() {
                tracing::debug!(error = %e, "close after stream loss failed; ignored");
            }
        }
        self.in_atomic_block = false;
        self.needs_rollback = false;
        self.autocommit = true;
    }

    /// Close the native handle. Closing a closed connection is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut native) = self.native.take() else {
            return Ok(());
        };
        self.in_atomic_block = false;
        self.needs_rollback = false;
        self.autocommit = true;
        native.close().map_err(|e| translate_native_error(e, None))?;
        tracing::info!(database = %self.plan.target, "libsql connection closed");
        Ok(())
    }

    /// Ping the open handle with `SELECT 1`.
    pub fn is_usable(&mut self) -> bool {
        let Some(native) = self.native.as_deref_mut() else {
            return false;
        };
        let ping = native.cursor().and_then(|mut cur| {
            let result = cur.execute("SELECT 1", &Params::None);
            if let Err(e) = cur.close() {
                tracing::debug!(error = %e, "close after ping failed; ignored");
            }
            result
        });
        ping.is_ok()
    }

    /// Open a cursor. Connects first if needed.
    pub fn cursor(&mut self) -> Result<Cursor<'_>> {
        let opened = self.native()?.cursor();
        let native = match opened {
            Ok(native) => native,
            Err(e) => return Err(self.handle_native_error(e, None)),
        };
        Ok(Cursor::new(self, native))
    }

    pub fn get_autocommit(&self) -> bool {
        match self.native.as_deref() {
            Some(native) => native.autocommit(),
            None => self.autocommit,
        }
    }

    /// Apply the autocommit flag. Turning autocommit on commits any pending
    /// implicit transaction; a failure of that commit is ignored unless the
    /// stream was lost, which closes the connection.
    pub fn set_autocommit(&mut self, autocommit: bool) -> Result<()> {
        let applied = self.native()?.set_autocommit(autocommit);
        if let Err(e) = applied {
            return Err(self.handle_native_error(e, None));
        }
        self.autocommit = autocommit;

        if autocommit {
            let committed = self.native()?.commit();
            if let Err(e) = committed {
                if classify(&e) == Some(NativeErrorClass::StreamLost) {
                    tracing::warn!(error = %e, "commit after enabling autocommit lost the stream, closing connection");
                    self.discard();
                } else {
                    tracing::debug!(error = %e, "commit after enabling autocommit failed; ignored");
                }
            }
        }
        Ok(())
    }

    /// Is a transaction open on the native handle?
    pub fn in_transaction(&self) -> bool {
        self.native.as_deref().is_some_and(|n| n.in_transaction())
    }

    /// Start an explicit transaction while autocommit is on.
    pub fn begin_under_autocommit(&mut self) -> Result<()> {
        let mut cur = self.cursor()?;
        cur.execute("BEGIN", &Params::None)?;
        cur.close()
    }

    pub fn commit(&mut self) -> Result<()> {
        let committed = self.native()?.commit();
        if let Err(e) = committed {
            return Err(self.handle_native_error(e, Some("COMMIT")));
        }
        tracing::trace!("commit");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        let rolled_back = self.native()?.rollback();
        if let Err(e) = rolled_back {
            return Err(self.handle_native_error(e, Some("ROLLBACK")));
        }
        tracing::trace!("rollback");
        Ok(())
    }

    /// Run `f` inside a transaction.
    ///
    /// The outermost block begins a transaction and commits it when `f`
    /// succeeds, rolling back otherwise. With autocommit off and a
    /// transaction already open, the block joins it instead of beginning a
    /// new one, and commits or rolls back the whole transaction. Nested
    /// blocks join the outer transaction; an error inside one marks the
    /// outer block for rollback even if the caller recovers from it.
    pub fn atomic<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut LibsqlConnection) -> Result<T>,
    {
        if self.in_atomic_block {
            let result = f(self);
            if result.is_err() {
                self.needs_rollback = true;
            }
            return result;
        }

        if self.get_autocommit() || !self.in_transaction() {
            self.begin_under_autocommit()?;
        }
        self.in_atomic_block = true;
        self.needs_rollback = false;

        let result = f(self);

        let was_open = self.in_atomic_block;
        self.in_atomic_block = false;
        let needs_rollback = std::mem::take(&mut self.needs_rollback);

        if !was_open {
            // The connection was closed inside the block
            return result;
        }

        match result {
            Ok(value) if !needs_rollback => {
                self.commit()?;
                Ok(value)
            }
            Ok(_) => {
                self.rollback()?;
                Err(Error::Custom(
                    "transaction rolled back: an inner atomic block failed".to_string(),
                ))
            }
            Err(e) => {
                if self.native.is_some() {
                    if let Err(rollback_err) = self.rollback() {
                        tracing::debug!(error = %rollback_err, "rollback after failed atomic block failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Turn foreign key enforcement off. Always reports `true`.
    pub fn disable_constraint_checking(&mut self) -> Result<bool> {
        let mut cur = self.cursor()?;
        cur.execute("PRAGMA foreign_keys = OFF", &Params::None)?;
        cur.close()?;
        self.needs_rollback = false;
        Ok(true)
    }

    /// Turn foreign key enforcement back on.
    pub fn enable_constraint_checking(&mut self) -> Result<()> {
        let mut cur = self.cursor()?;
        cur.execute("PRAGMA foreign_keys = ON", &Params::None)?;
        cur.close()
    }

    /// Check foreign keys of `tables` (all tables when empty).
    ///
    /// Fails with an integrity error naming the first violating row.
    pub fn check_constraints(&mut self, tables: &[&str]) -> Result<()> {
        let ops = DatabaseOperations;
        let statements: Vec<String> = if tables.is_empty() {
            vec!["PRAGMA foreign_key_check".to_string()]
        } else {
            tables
                .iter()
                .map(|t| format!("PRAGMA foreign_key_check({})", ops.quote_name(t)))
                .collect()
        };

        for sql in statements {
            let mut cur = self.cursor()?;
            cur.execute(&sql, &Params::None)?;
            let violation = cur.fetchone()?;
            cur.close()?;

            if let Some(row) = violation {
                let table: String = row.get_as(0)?;
                let rowid: Option<i64> = row.get_as(1)?;
                let parent: String = row.get_as(2)?;
                let rowid = rowid.map_or_else(|| "NULL".to_string(), |id| id.to_string());
                return Err(Error::Integrity(IntegrityError {
                    message: format!(
                        "The row in table '{}' with primary key '{}' has an invalid foreign key: it does not reference a row in table '{}'.",
                        table, rowid, parent
                    ),
                    sql: Some(sql),
                    source: None,
                }));
            }
        }
        Ok(())
    }

    /// Run schema changes in `f` and commit them.
    ///
    /// Statements that ran before a failure stay applied.
    pub fn edit_schema<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SchemaEditor<'_>) -> Result<T>,
    {
        SchemaEditor::run(self, f)
    }

    /// Capability flags, computed from the current settings.
    pub fn features(&self) -> DatabaseFeatures<'_> {
        DatabaseFeatures::new(&self.settings, self.driver.engine_version())
    }

    pub fn ops(&self) -> DatabaseOperations {
        DatabaseOperations
    }

    /// Pull the remote primary into the local replica.
    pub fn sync(&mut self) -> Result<SyncOutcome> {
        match self.plan.mode {
            ConnectionMode::EmbeddedReplica => {}
            ConnectionMode::InMemory => {
                return Err(Error::operational(
                    OperationalErrorKind::SyncUnavailable,
                    SYNC_NOT_IN_MEMORY,
                ));
            }
            ConnectionMode::RemoteOnly | ConnectionMode::LocalFile => {
                return Err(Error::operational(
                    OperationalErrorKind::SyncUnavailable,
                    SYNC_REPLICA_ONLY,
                ));
            }
        }

        let started = Instant::now();
        let synced = self.native()?.sync();
        if let Err(e) = synced {
            return Err(self.sync_error(e));
        }
        let outcome = SyncOutcome {
            duration: started.elapsed(),
        };
        tracing::info!(
            database = %self.plan.target,
            duration_ms = outcome.duration.as_millis() as u64,
            "replica synced"
        );
        Ok(outcome)
    }

    fn sync_error(&mut self, err: NativeError) -> Error {
        match classify(&err) {
            Some(NativeErrorClass::SyncRemoteMode) => {
                return Error::operational(OperationalErrorKind::SyncUnavailable, SYNC_REPLICA_ONLY);
            }
            Some(NativeErrorClass::SyncMemoryMode) => {
                return Error::operational(OperationalErrorKind::SyncUnavailable, SYNC_NOT_IN_MEMORY);
            }
            Some(NativeErrorClass::StreamLost) => {
                tracing::warn!(error = %err, "sync lost the remote stream, closing connection");
                self.discard();
            }
            _ => {}
        }

        let message = format!("Failed to sync database: {}", err.message);
        Error::Operational(OperationalError {
            kind: OperationalErrorKind::SyncFailed,
            message,
            source: Some(err),
        })
    }
}

impl Drop for LibsqlConnection {
    fn drop(&mut self) {
        if let Some(mut native) = self.native.take() {
            if let Err(e) = native.close() {
                tracing::debug!(error = %e, "close on drop failed");
            }
        }
    }
}
