//! Schema change executor.
//!
//! Remote primaries do not keep DDL that sits in an open transaction after
//! the session ends, so schema changes never run atomically here. Each
//! statement runs under autocommit and the scope ends with an explicit
//! commit. A failure part way through leaves earlier statements applied.

use crate::connection::LibsqlConnection;
use libsql_backend_core::{Params, Result};

/// Executes DDL for one [`LibsqlConnection::edit_schema`] scope.
#[derive(Debug)]
pub struct SchemaEditor<'c> {
    conn: &'c mut LibsqlConnection,
    deferred: Vec<String>,
    executed: usize,
    atomic_migration: bool,
}

impl<'c> SchemaEditor<'c> {
    pub(crate) fn run<T, F>(conn: &'c mut LibsqlConnection, f: F) -> Result<T>
    where
        F: FnOnce(&mut SchemaEditor<'_>) -> Result<T>,
    {
        if !conn.in_atomic_block() {
            conn.set_autocommit(true)?;
        }
        conn.disable_constraint_checking()?;

        let mut editor = SchemaEditor {
            conn,
            deferred: Vec::new(),
            executed: 0,
            atomic_migration: false,
        };

        match f(&mut editor).and_then(|value| editor.finish().map(|()| value)) {
            Ok(value) => Ok(value),
            Err(e) => {
                editor.restore_constraints();
                Err(e)
            }
        }
    }

    /// Execute one schema statement now.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.execute_with(sql, &Params::None)
    }

    pub fn execute_with(&mut self, sql: &str, params: &Params) -> Result<()> {
        tracing::debug!(sql = %sql, "schema statement");
        let mut cur = self.conn.cursor()?;
        cur.execute(sql, params)?;
        cur.close()?;
        self.executed += 1;
        Ok(())
    }

    /// Queue a statement to run when the scope ends successfully.
    pub fn defer(&mut self, sql: impl Into<String>) {
        self.deferred.push(sql.into());
    }

    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }

    /// Number of statements executed so far, deferred ones included.
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Schema changes are never wrapped in a transaction.
    pub fn atomic_migration(&self) -> bool {
        self.atomic_migration
    }

    /// Ignored: the flag stays `false`.
    pub fn set_atomic_migration(&mut self, atomic: bool) {
        if atomic {
            tracing::debug!("atomic migrations are unsupported; keeping them off");
        }
        self.atomic_migration = false;
    }

    pub fn connection(&mut self) -> &mut LibsqlConnection {
        self.conn
    }

    fn finish(&mut self) -> Result<()> {
        for sql in std::mem::take(&mut self.deferred) {
            self.execute(&sql)?;
        }
        self.conn.enable_constraint_checking()?;
        self.conn.commit()?;
        tracing::debug!(statements = self.executed, "schema changes committed");
        Ok(())
    }

    fn restore_constraints(&mut self) {
        if !self.conn.is_connected() {
            return;
        }
        if let Err(e) = self.conn.enable_constraint_checking() {
            tracing::warn!(error = %e, "could not re-enable constraint checking after failed schema change");
        }
    }
}
