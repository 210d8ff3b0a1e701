//! SQLite-backed native driver for the libSQL backend.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `NativeDriver` boundary from
//! `libsql-backend-core` on top of the bundled SQLite library.
//!
//! # Handle kinds
//!
//! - memory targets (`:memory:`, `file::memory:`, `mode=memory`) open a private in-memory database
//! - local paths without a sync URL open a plain file
//! - remote URLs open a registered primary directly
//! - local paths with a sync URL open an embedded replica of that primary
//!
//! # Example
//!
//! ```rust,ignore
//! use libsql_backend_core::{ConnectOptions, NativeDriver, Params};
//! use libsql_backend_sqlite::SqliteDriver;
//!
//! let driver = SqliteDriver::new().with_primary("libsql://db.example.io", "/srv/primary.db");
//! let mut replica = driver.connect(
//!     "replica.db",
//!     &ConnectOptions::new().sync_url("libsql://db.example.io"),
//! )?;
//! let mut cur = replica.cursor()?;
//! cur.execute("INSERT INTO items (name) VALUES (?)", &Params::positional(["r1"]))?;
//! replica.sync()?;
//! ```
//!
//! # Thread Safety
//!
//! Native connections are `Send`. A handle's state sits behind a
//! `parking_lot::Mutex` shared with its cursors and its background sync
//! timer, so the timer thread and the owning worker never run concurrently
//! against SQLite.

pub mod connection;
pub mod cursor;
pub mod driver;
pub mod ffi;
mod session;
pub mod sync;
pub mod types;

pub use connection::{SqliteConfig, SqliteHandle, StatementKind, StatementOutput};
pub use cursor::SqliteCursor;
pub use driver::{
    REMOTE_SCHEMES, SqliteDriver, SqliteNativeConnection, is_memory_target, is_remote_target,
};
pub use sync::SyncTimer;

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_returning_is_available_in_bundled_build() {
        // RETURNING landed in 3.35.0
        assert!(sqlite_version_number() >= 3_035_000);
    }
}
