//! DB-API style cursor over a native SQLite session.
//!
//! Statements run to completion on `execute`; rows are buffered and handed
//! out by the fetch methods.

use crate::session::Session;
use libsql_backend_core::{ColumnInfo, NativeCursor, NativeError, NativeResult, Params, Row};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of rows returned by `fetchmany(None)`.
pub const DEFAULT_ARRAY_SIZE: usize = 1;

pub struct SqliteCursor {
    session: Arc<Mutex<Session>>,
    rows: VecDeque<Row>,
    columns: Option<Arc<ColumnInfo>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
    closed: bool,
}

impl SqliteCursor {
    pub(crate) fn new(session: Arc<Mutex<Session>>) -> Self {
        Self {
            session,
            rows: VecDeque::new(),
            columns: None,
            rowcount: -1,
            lastrowid: None,
            arraysize: DEFAULT_ARRAY_SIZE,
            closed: false,
        }
    }

    /// Set the default batch size for `fetchmany`.
    pub fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size.max(1);
    }

    fn check_open(&self) -> NativeResult<()> {
        if self.closed {
            Err(NativeError::new("Cannot operate on a closed cursor."))
        } else {
            Ok(())
        }
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.columns = None;
        self.rowcount = -1;
    }
}

impl NativeCursor for SqliteCursor {
    fn execute(&mut self, sql: &str, params: &Params) -> NativeResult<()> {
        self.check_open()?;
        self.reset();
        let output = self.session.lock().run(sql, params)?;
        self.rows = output.rows.into();
        self.columns = output.columns;
        self.rowcount = output.rowcount;
        if output.last_insert_rowid.is_some() {
            self.lastrowid = output.last_insert_rowid;
        }
        Ok(())
    }

    fn executemany(&mut self, sql: &str, batches: &[Params]) -> NativeResult<()> {
        self.check_open()?;
        self.reset();
        let mut total = 0;
        let mut session = self.session.lock();
        for params in batches {
            let output = session.run(sql, params)?;
            if output.rowcount > 0 {
                total += output.rowcount;
            }
            if output.last_insert_rowid.is_some() {
                self.lastrowid = output.last_insert_rowid;
            }
        }
        self.rowcount = total;
        Ok(())
    }

    fn fetchone(&mut self) -> NativeResult<Option<Row>> {
        self.check_open()?;
        Ok(self.rows.pop_front())
    }

    fn fetchmany(&mut self, size: Option<usize>) -> NativeResult<Vec<Row>> {
        self.check_open()?;
        let n = size.unwrap_or(self.arraysize).min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }

    fn fetchall(&mut self) -> NativeResult<Vec<Row>> {
        self.check_open()?;
        Ok(self.rows.drain(..).collect())
    }

    fn rowcount(&self) -> i64 {
        self.rowcount
    }

    fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    fn description(&self) -> Option<Vec<String>> {
        self.columns.as_ref().map(|c| c.names().to_vec())
    }

    fn close(&mut self) -> NativeResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}
