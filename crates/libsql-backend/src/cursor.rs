//! Cursor adapter over a native cursor.
//!
//! Translates ORM placeholders before each call and maps native failures
//! into the backend error taxonomy. A stream loss closes the owning
//! connection before the error is returned.

use crate::connection::LibsqlConnection;
use crate::errors::translate_fetch_error;
use crate::placeholders;
use libsql_backend_core::{Error, NativeCursor, Params, Result, Row};

/// A cursor borrowing one [`LibsqlConnection`].
///
/// The native cursor is closed exactly once, by [`Cursor::close`] or on
/// drop.
pub struct Cursor<'c> {
    conn: &'c mut LibsqlConnection,
    native: Option<Box<dyn NativeCursor>>,
    last_sql: Option<String>,
}

fn closed_cursor() -> Error {
    Error::Programming("Cannot operate on a closed cursor.".to_string())
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(conn: &'c mut LibsqlConnection, native: Box<dyn NativeCursor>) -> Self {
        Self {
            conn,
            native: Some(native),
            last_sql: None,
        }
    }

    /// Execute one statement.
    pub fn execute(&mut self, sql: &str, params: &Params) -> Result<&mut Self> {
        let translated = placeholders::translate(sql, params)?;
        let Some(native) = self.native.as_deref_mut() else {
            return Err(closed_cursor());
        };
        tracing::trace!(sql = %translated, "execute");

        let result = native.execute(&translated, params);
        self.last_sql = Some(translated.into_owned());
        match result {
            Ok(()) => Ok(self),
            Err(e) => Err(self.conn.handle_native_error(e, self.last_sql.as_deref())),
        }
    }

    /// Execute one statement once per entry of `batches`.
    ///
    /// The statement is translated once, using the first entry's shape.
    pub fn executemany(&mut self, sql: &str, batches: &[Params]) -> Result<&mut Self> {
        let translated = placeholders::translate_batch(sql, batches)?;
        let Some(native) = self.native.as_deref_mut() else {
            return Err(closed_cursor());
        };
        tracing::trace!(sql = %translated, batches = batches.len(), "executemany");

        let result = native.executemany(&translated, batches);
        self.last_sql = Some(translated.into_owned());
        match result {
            Ok(()) => Ok(self),
            Err(e) => Err(self.conn.handle_native_error(e, self.last_sql.as_deref())),
        }
    }

    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        let native = self.native.as_deref_mut().ok_or_else(closed_cursor)?;
        native
            .fetchone()
            .map_err(|e| translate_fetch_error(e, self.last_sql.as_deref()))
    }

    /// Fetch up to `size` rows, or the native array size when `None`.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        let native = self.native.as_deref_mut().ok_or_else(closed_cursor)?;
        native
            .fetchmany(size)
            .map_err(|e| translate_fetch_error(e, self.last_sql.as_deref()))
    }

    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        let native = self.native.as_deref_mut().ok_or_else(closed_cursor)?;
        native
            .fetchall()
            .map_err(|e| translate_fetch_error(e, self.last_sql.as_deref()))
    }

    /// Rows changed by the last DML statement, `-1` otherwise.
    pub fn rowcount(&self) -> i64 {
        self.native.as_deref().map_or(-1, |n| n.rowcount())
    }

    pub fn lastrowid(&self) -> Option<i64> {
        self.native.as_deref().and_then(|n| n.lastrowid())
    }

    /// Column names of the last query.
    pub fn description(&self) -> Option<Vec<String>> {
        self.native.as_deref().and_then(|n| n.description())
    }

    /// The last statement as sent to the native driver.
    pub fn last_sql(&self) -> Option<&str> {
        self.last_sql.as_deref()
    }

    pub fn connection(&mut self) -> &mut LibsqlConnection {
        self.conn
    }

    /// Close the native cursor.
    pub fn close(mut self) -> Result<()> {
        match self.native.take() {
            Some(mut native) => native.close().map_err(Error::Native),
            None => Ok(()),
        }
    }
}

/// Iterates the remaining rows of the current result set.
impl Iterator for Cursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone().transpose()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Some(mut native) = self.native.take() {
            if let Err(e) = native.close() {
                tracing::debug!(error = %e, "cursor close on drop failed");
            }
        }
    }
}
