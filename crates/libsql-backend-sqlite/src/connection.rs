//! Safe wrapper around one SQLite database handle.
//!
//! [`SqliteHandle`] owns a `sqlite3*` and exposes the few operations the
//! driver needs: batch execution, single-statement execution with parameter
//! binding, autocommit inspection and whole-database copy through the online
//! backup API (used to pull a primary into a replica file).

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use libsql_backend_core::{ColumnInfo, NativeError, NativeResult, Params, Row};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Configuration for opening SQLite handles.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open read-only instead of read-write-create.
    pub read_only: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    fn open_flags(&self) -> c_int {
        let mode = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        mode | ffi::SQLITE_OPEN_URI
    }
}

/// Coarse statement classification by leading keyword.
///
/// Drives implicit transactions and `rowcount` reporting. A `Query` may
/// still write (`WITH ... INSERT`); [`SqliteHandle::is_read_only`] decides
/// replica routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, VALUES, WITH, EXPLAIN
    Query,
    /// INSERT, UPDATE, DELETE, REPLACE
    Dml,
    /// BEGIN, COMMIT, END, ROLLBACK, SAVEPOINT, RELEASE
    Transaction,
    Pragma,
    /// DDL and everything else
    Other,
}

impl StatementKind {
    pub fn of(sql: &str) -> Self {
        let keyword: String = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "VALUES" | "WITH" | "EXPLAIN" => StatementKind::Query,
            "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Dml,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Transaction
            }
            "PRAGMA" => StatementKind::Pragma,
            _ => StatementKind::Other,
        }
    }

    /// Could this statement be read-only? Only `Query` statements qualify.
    pub fn is_read(self) -> bool {
        matches!(self, StatementKind::Query)
    }
}

/// Everything one statement execution produced.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    /// Column metadata, present when the statement returns columns
    pub columns: Option<Arc<ColumnInfo>>,
    pub rows: Vec<Row>,
    /// Rows modified, `-1` for statements that are not DML
    pub rowcount: i64,
    /// Last inserted rowid after DML
    pub last_insert_rowid: Option<i64>,
}

/// An open SQLite database handle.
pub struct SqliteHandle {
    db: *mut ffi::sqlite3,
    path: String,
}

// SAFETY: a handle is only ever used by one thread at a time; the driver
// keeps every handle behind a Mutex.
unsafe impl Send for SqliteHandle {}

impl std::fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteHandle {
    /// Open a new SQLite handle with the given configuration.
    pub fn open(config: &SqliteConfig) -> NativeResult<Self> {
        let c_path = CString::new(config.path.as_str())
            .map_err(|_| NativeError::new("SQLITE_CANTOPEN: Invalid path: contains null byte"))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: We pass valid pointers and check the return value
        let rc =
            unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.open_flags(), ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid even on failure and must still be closed
                unsafe {
                    let msg = CStr::from_ptr(ffi::sqlite3_errmsg(db))
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(NativeError::new(format!(
                "{}: Failed to open database {}: {}",
                ffi::code_name(rc),
                config.path,
                msg
            )));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::trace!(path = %config.path, "opened sqlite handle");

        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> NativeResult<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> NativeResult<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute one or more statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> NativeResult<()> {
        let c_sql = CString::new(sql)
            .map_err(|_| NativeError::new("SQLITE_MISUSE: SQL contains null byte"))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid sqlite-allocated string
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            };
            // SAFETY: db is valid
            let code = unsafe { ffi::sqlite3_extended_errcode(self.db) };
            return Err(NativeError::new(format!("{}: {}", ffi::code_name(code), msg)));
        }

        Ok(())
    }

    /// Prepare, bind and run a single statement, collecting every row.
    pub fn run(&self, sql: &str, params: &Params) -> NativeResult<StatementOutput> {
        let kind = StatementKind::of(sql);
        let Some(stmt) = self.prepare(sql)? else {
            // Empty statement (whitespace or comments only)
            return Ok(StatementOutput {
                rowcount: -1,
                ..StatementOutput::default()
            });
        };
        let guard = StmtGuard(stmt);
        // SAFETY: stmt is valid
        let writes = unsafe { ffi::sqlite3_stmt_readonly(guard.0) } == 0;
        let kind = if kind == StatementKind::Query && writes {
            StatementKind::Dml
        } else {
            kind
        };

        // SAFETY: stmt is a valid prepared statement
        unsafe { types::bind_params(guard.0, params) }?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(guard.0) };
        let columns = (col_count > 0).then(|| {
            let names = (0..col_count)
                // SAFETY: index is within the column count
                .map(|i| unsafe { types::column_name(guard.0, i) }.unwrap_or_else(|| format!("col{}", i)))
                .collect();
            Arc::new(ColumnInfo::new(names))
        });

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(guard.0) };
            match rc {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: we just got SQLITE_ROW and i is a valid column index
                        .map(|i| unsafe { types::read_column(guard.0, i) })
                        .collect();
                    let info = columns
                        .clone()
                        .unwrap_or_else(|| Arc::new(ColumnInfo::new(Vec::new())));
                    rows.push(Row::with_columns(info, values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(self.last_error()),
            }
        }
        drop(guard);

        let (rowcount, last_insert_rowid) = if kind == StatementKind::Dml {
            // SAFETY: db is valid
            unsafe {
                (
                    i64::from(ffi::sqlite3_changes(self.db)),
                    Some(ffi::sqlite3_last_insert_rowid(self.db)),
                )
            }
        } else {
            (-1, None)
        };

        tracing::trace!(path = %self.path, sql, rows = rows.len(), rowcount, "statement complete");

        Ok(StatementOutput {
            columns,
            rows,
            rowcount,
            last_insert_rowid,
        })
    }

    /// Does `sql` prepare on this handle as a statement that cannot write?
    ///
    /// A statement that fails to prepare is not provably read-only.
    pub fn is_read_only(&self, sql: &str) -> bool {
        match self.prepare(sql) {
            Ok(Some(stmt)) => {
                let guard = StmtGuard(stmt);
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_stmt_readonly(guard.0) != 0 }
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Is the handle outside any transaction?
    pub fn is_autocommit(&self) -> bool {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_get_autocommit(self.db) != 0 }
    }

    /// Replace this database's content with a snapshot of `source`.
    pub fn copy_from(&self, source: &SqliteHandle) -> NativeResult<()> {
        let main = c"main";

        // SAFETY: both handles are valid; "main" is a static C string
        let backup =
            unsafe { ffi::sqlite3_backup_init(self.db, main.as_ptr(), source.db, main.as_ptr()) };
        if backup.is_null() {
            return Err(self.last_error());
        }

        // SAFETY: backup is valid until finished
        let step = unsafe { ffi::sqlite3_backup_step(backup, -1) };
        // SAFETY: backup is valid; finish releases it
        let finish = unsafe { ffi::sqlite3_backup_finish(backup) };

        if step != ffi::SQLITE_DONE {
            return Err(NativeError::new(format!(
                "{}: replica copy from {} failed: {}",
                ffi::code_name(step),
                source.path,
                ffi::error_string(step)
            )));
        }
        if finish != ffi::SQLITE_OK {
            return Err(self.last_error());
        }
        Ok(())
    }

    fn prepare(&self, sql: &str) -> NativeResult<Option<*mut ffi::sqlite3_stmt>> {
        let c_sql = CString::new(sql)
            .map_err(|_| NativeError::new("SQLITE_MISUSE: SQL contains null byte"))?;
        let bytes = c_sql.as_bytes();

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const std::ffi::c_char = ptr::null();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                bytes.len() as c_int,
                &mut stmt,
                &mut tail,
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(self.last_error());
        }

        let consumed = if tail.is_null() {
            bytes.len()
        } else {
            // SAFETY: tail points into c_sql's buffer
            (unsafe { tail.offset_from(c_sql.as_ptr()) }).max(0) as usize
        };
        let rest = String::from_utf8_lossy(&bytes[consumed.min(bytes.len())..]);
        if !rest.trim_matches(|c: char| c.is_whitespace() || c == ';').is_empty() {
            if !stmt.is_null() {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(NativeError::new(
                "SQLITE_MISUSE: You can only execute one statement at a time.",
            ));
        }

        Ok((!stmt.is_null()).then_some(stmt))
    }

    fn last_error(&self) -> NativeError {
        // SAFETY: db is valid, errmsg returns a valid C string
        let (code, msg) = unsafe {
            (
                ffi::sqlite3_extended_errcode(self.db),
                CStr::from_ptr(ffi::sqlite3_errmsg(self.db))
                    .to_string_lossy()
                    .into_owned(),
            )
        };
        NativeError::new(format!("{}: {}", ffi::code_name(code), msg))
    }
}

impl Drop for SqliteHandle {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid; every statement and backup is finished before
            // the call that created it returns
            unsafe {
                ffi::sqlite3_close(self.db);
            }
            tracing::trace!(path = %self.path, "closed sqlite handle");
        }
    }
}

/// Finalizes a prepared statement on every exit path.
struct StmtGuard(*mut ffi::sqlite3_stmt);

impl Drop for StmtGuard {
    fn drop(&mut self) {
        // SAFETY: the statement was prepared by this handle and not yet finalized
        unsafe { ffi::sqlite3_finalize(self.0) };
    }
}
