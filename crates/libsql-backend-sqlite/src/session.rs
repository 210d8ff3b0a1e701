//! Native connection state shared by a handle, its cursors and its sync timer.
//!
//! A [`Session`] owns the SQLite handles behind one native connection:
//!
//! | Storage   | Reads   | Writes                          | `sync()`           |
//! |-----------|---------|---------------------------------|--------------------|
//! | `Memory`  | handle  | handle                          | fails (Memory)     |
//! | `Local`   | handle  | handle                          | fails (Local)      |
//! | `Remote`  | primary | primary                         | fails (Remote)     |
//! | `Replica` | local   | primary, then pulled into local | pull primary       |
//!
//! After a committed write a replica pulls the primary into its local file,
//! which gives read-your-writes on the same handle. While the primary holds
//! an open transaction, replica reads go to the primary so they see its
//! uncommitted writes. Other handles see the write after their own sync
//! (manual or interval).
//!
//! Only statements that prepare as read-only on the local file count as
//! reads, so `WITH ... INSERT` reaches the primary.

use crate::connection::{SqliteHandle, StatementKind, StatementOutput};
use crate::driver::PrimaryLink;
use libsql_backend_core::{NativeError, NativeResult, Params};

pub(crate) enum Storage {
    Memory(SqliteHandle),
    Local(SqliteHandle),
    Remote {
        primary: SqliteHandle,
        link: PrimaryLink,
    },
    Replica {
        local: SqliteHandle,
        primary: SqliteHandle,
        link: PrimaryLink,
    },
}

impl Storage {
    pub(crate) fn mode_name(&self) -> &'static str {
        match self {
            Storage::Memory(_) => "Memory",
            Storage::Local(_) => "Local",
            Storage::Remote { .. } => "Remote",
            Storage::Replica { .. } => "Replica",
        }
    }

    /// The handle that read-only statements run on outside a transaction.
    fn reader(&self) -> &SqliteHandle {
        match self {
            Storage::Memory(handle) | Storage::Local(handle) => handle,
            Storage::Remote { primary, .. } => primary,
            Storage::Replica { local, .. } => local,
        }
    }

    /// The handle that owns transactions and receives writes.
    fn writer(&self) -> NativeResult<&SqliteHandle> {
        match self {
            Storage::Memory(handle) | Storage::Local(handle) => Ok(handle),
            Storage::Remote { primary, link } | Storage::Replica { primary, link, .. } => {
                link.check()?;
                Ok(primary)
            }
        }
    }
}

pub(crate) struct Session {
    storage: Option<Storage>,
    autocommit: bool,
}

impl Session {
    pub(crate) fn new(storage: Storage) -> Self {
        Self {
            storage: Some(storage),
            autocommit: true,
        }
    }

    fn storage(&self) -> NativeResult<&Storage> {
        self.storage
            .as_ref()
            .ok_or_else(|| NativeError::new("Cannot operate on a closed database."))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.storage.is_none()
    }

    pub(crate) fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub(crate) fn set_autocommit(&mut self, autocommit: bool) -> NativeResult<()> {
        self.storage()?;
        self.autocommit = autocommit;
        Ok(())
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.storage
            .as_ref()
            .and_then(|storage| storage.writer().ok())
            .is_some_and(|writer| !writer.is_autocommit())
    }

    /// Execute one statement, routed according to the storage kind.
    pub(crate) fn run(&mut self, sql: &str, params: &Params) -> NativeResult<StatementOutput> {
        let storage = self.storage()?;
        let kind = match StatementKind::of(sql) {
            StatementKind::Query if !storage.reader().is_read_only(sql) => StatementKind::Dml,
            kind => kind,
        };
        let implicit_begin = !self.autocommit && kind == StatementKind::Dml;

        match storage {
            Storage::Replica { local, primary, .. }
                if kind.is_read() && primary.is_autocommit() =>
            {
                local.run(sql, params)
            }
            Storage::Replica {
                local,
                primary,
                link,
            } => {
                link.check()?;
                let output = run_on(primary, sql, params, implicit_begin)?;
                if kind == StatementKind::Pragma {
                    // Connection-level pragmas must hold on both sides
                    return local.run(sql, params);
                }
                if primary.is_autocommit() && !kind.is_read() {
                    local.copy_from(primary)?;
                }
                Ok(output)
            }
            storage => run_on(storage.writer()?, sql, params, implicit_begin),
        }
    }

    pub(crate) fn commit(&mut self) -> NativeResult<()> {
        let storage = self.storage()?;
        let writer = storage.writer()?;
        if writer.is_autocommit() {
            return Ok(());
        }
        writer.execute_batch("COMMIT")?;
        if let Storage::Replica { local, primary, .. } = storage {
            local.copy_from(primary)?;
        }
        Ok(())
    }

    pub(crate) fn rollback(&mut self) -> NativeResult<()> {
        let writer = self.storage()?.writer()?;
        if writer.is_autocommit() {
            return Ok(());
        }
        writer.execute_batch("ROLLBACK")
    }

    /// Pull the primary into the local replica file.
    pub(crate) fn sync(&mut self) -> NativeResult<()> {
        match self.storage()? {
            Storage::Replica {
                local,
                primary,
                link,
            } => {
                link.check()?;
                local.copy_from(primary)?;
                tracing::trace!(primary = %link.url(), local = %local.path(), "replica pulled");
                Ok(())
            }
            other => Err(NativeError::new(format!(
                "sync not supported in databases opened in {} mode",
                other.mode_name()
            ))),
        }
    }

    /// Drop every handle. Idempotent.
    pub(crate) fn close(&mut self) {
        if let Some(storage) = self.storage.take() {
            tracing::trace!(mode = storage.mode_name(), "session closed");
        }
    }
}

fn run_on(
    handle: &SqliteHandle,
    sql: &str,
    params: &Params,
    implicit_begin: bool,
) -> NativeResult<StatementOutput> {
    if implicit_begin && handle.is_autocommit() {
        handle.execute_batch("BEGIN")?;
    }
    handle.run(sql, params)
}
