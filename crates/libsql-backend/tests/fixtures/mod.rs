//! Scripted native driver for exercising adapter error paths.
//!
//! The driver records every call into a shared [`Script`] and fails calls
//! on demand, so tests can produce stream loss and constraint failures
//! without a remote primary.

#![allow(dead_code)]

use libsql_backend_core::{
    ConnectOptions, EngineVersion, NativeConnection, NativeCursor, NativeDriver, NativeError,
    NativeResult, Params, Row, Value,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub const STREAM_LOST: &str = "Hrana: `stream error: stream not found`";
pub const UNIQUE_FAILED: &str = "SQLITE_CONSTRAINT_UNIQUE: UNIQUE constraint failed: items.name";

#[derive(Debug, Default)]
pub struct Script {
    pub connects: Vec<(String, ConnectOptions)>,
    /// SQL as received by the native cursor
    pub statements: Vec<String>,
    /// (SQL, batch size) for each `executemany`
    pub batches: Vec<(String, usize)>,
    /// One-shot failures: the first entry whose pattern occurs in the SQL fails it
    pub execute_failures: Vec<(String, String)>,
    pub fetch_failure: Option<String>,
    pub commit_failure: Option<String>,
    pub rollback_failure: Option<String>,
    pub sync_failure: Option<String>,
    /// Rows handed to the next executed query
    pub rows: VecDeque<Row>,
    pub autocommit_calls: Vec<bool>,
    pub commits: usize,
    pub rollbacks: usize,
    pub syncs: usize,
    pub connection_closes: usize,
    pub cursor_closes: usize,
}

impl Script {
    pub fn fail_execute(&mut self, pattern: &str, message: &str) {
        self.execute_failures
            .push((pattern.to_string(), message.to_string()));
    }

    fn take_execute_failure(&mut self, sql: &str) -> Option<NativeError> {
        let index = self
            .execute_failures
            .iter()
            .position(|(pattern, _)| sql.contains(pattern.as_str()))?;
        let (_, message) = self.execute_failures.remove(index);
        Some(NativeError::new(message))
    }
}

#[derive(Clone)]
pub struct ScriptedDriver {
    pub script: Arc<Mutex<Script>>,
    pub version: EngineVersion,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            version: EngineVersion::new(3, 45, 1),
        }
    }

    pub fn with_version(mut self, version: EngineVersion) -> Self {
        self.version = version;
        self
    }
}

impl NativeDriver for ScriptedDriver {
    fn connect(&self, target: &str, options: &ConnectOptions) -> NativeResult<Box<dyn NativeConnection>> {
        self.script
            .lock()
            .connects
            .push((target.to_string(), options.clone()));
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            autocommit: false,
            in_transaction: Arc::new(Mutex::new(false)),
            closed: false,
        }))
    }

    fn engine_version(&self) -> EngineVersion {
        self.version
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    autocommit: bool,
    in_transaction: Arc<Mutex<bool>>,
    closed: bool,
}

impl ScriptedConnection {
    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            return Err(NativeError::new("Cannot operate on a closed database."));
        }
        Ok(())
    }
}

impl NativeConnection for ScriptedConnection {
    fn cursor(&mut self) -> NativeResult<Box<dyn NativeCursor>> {
        self.check_open()?;
        Ok(Box::new(ScriptedCursor {
            script: Arc::clone(&self.script),
            in_transaction: Arc::clone(&self.in_transaction),
            rows: VecDeque::new(),
            rowcount: -1,
        }))
    }

    fn commit(&mut self) -> NativeResult<()> {
        self.check_open()?;
        let mut script = self.script.lock();
        script.commits += 1;
        if let Some(message) = script.commit_failure.take() {
            return Err(NativeError::new(message));
        }
        *self.in_transaction.lock() = false;
        Ok(())
    }

    fn rollback(&mut self) -> NativeResult<()> {
        self.check_open()?;
        let mut script = self.script.lock();
        script.rollbacks += 1;
        if let Some(message) = script.rollback_failure.take() {
            return Err(NativeError::new(message));
        }
        *self.in_transaction.lock() = false;
        Ok(())
    }

    fn close(&mut self) -> NativeResult<()> {
        if !self.closed {
            self.closed = true;
            self.script.lock().connection_closes += 1;
        }
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()> {
        self.check_open()?;
        self.script.lock().autocommit_calls.push(autocommit);
        self.autocommit = autocommit;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        *self.in_transaction.lock()
    }

    fn sync(&mut self) -> NativeResult<()> {
        self.check_open()?;
        let mut script = self.script.lock();
        script.syncs += 1;
        match script.sync_failure.take() {
            Some(message) => Err(NativeError::new(message)),
            None => Ok(()),
        }
    }
}

struct ScriptedCursor {
    script: Arc<Mutex<Script>>,
    in_transaction: Arc<Mutex<bool>>,
    rows: VecDeque<Row>,
    rowcount: i64,
}

impl NativeCursor for ScriptedCursor {
    fn execute(&mut self, sql: &str, _params: &Params) -> NativeResult<()> {
        let mut script = self.script.lock();
        script.statements.push(sql.to_string());
        if let Some(err) = script.take_execute_failure(sql) {
            return Err(err);
        }
        if sql.trim().eq_ignore_ascii_case("BEGIN") {
            *self.in_transaction.lock() = true;
        }
        self.rows = std::mem::take(&mut script.rows);
        self.rowcount = if sql.starts_with("INSERT") { 1 } else { -1 };
        Ok(())
    }

    fn executemany(&mut self, sql: &str, batches: &[Params]) -> NativeResult<()> {
        let mut script = self.script.lock();
        script.batches.push((sql.to_string(), batches.len()));
        if let Some(err) = script.take_execute_failure(sql) {
            return Err(err);
        }
        self.rowcount = batches.len() as i64;
        Ok(())
    }

    fn fetchone(&mut self) -> NativeResult<Option<Row>> {
        if let Some(message) = self.script.lock().fetch_failure.take() {
            return Err(NativeError::new(message));
        }
        Ok(self.rows.pop_front())
    }

    fn fetchmany(&mut self, size: Option<usize>) -> NativeResult<Vec<Row>> {
        let n = size.unwrap_or(1).min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }

    fn fetchall(&mut self) -> NativeResult<Vec<Row>> {
        Ok(self.rows.drain(..).collect())
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn lastrowid(&self) -> Option<i64> {
        None
    }

    fn description(&self) -> Option<Vec<String>> {
        None
    }

    fn close(&mut self) -> NativeResult<()> {
        self.script.lock().cursor_closes += 1;
        Ok(())
    }
}

/// A single-row result with the given columns.
pub fn row(columns: &[&str], values: Vec<Value>) -> Row {
    Row::new(columns.iter().map(|c| (*c).to_string()).collect(), values)
}
