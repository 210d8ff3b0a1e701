//! libSQL / Turso database backend for an ORM.
//!
//! The backend sits between the ORM's query layer and a native libSQL
//! driver. It resolves settings into one of four connection modes, adapts
//! placeholder styles and error classes, controls autocommit, commits
//! schema changes explicitly, reports capability flags and exposes manual
//! replica sync.
//!
//! # Connection modes
//!
//! | Settings                              | Mode              |
//! |---------------------------------------|-------------------|
//! | no target, `:memory:`, `mode=memory`  | `InMemory`        |
//! | `libsql://`, `wss://`, `https://`, .. | `RemoteOnly`      |
//! | local path + `sync_url`               | `EmbeddedReplica` |
//! | local path                            | `LocalFile`       |
//!
//! # Example
//!
//! ```rust,ignore
//! use libsql_backend::{ConnectionManager, DatabaseSettings};
//! use libsql_backend_core::Params;
//!
//! let settings = DatabaseSettings::replica("replica.db", "libsql://db.turso.io")
//!     .auth_token(token)
//!     .sync_interval(5.0);
//! let manager = ConnectionManager::sqlite(settings)?;
//!
//! let mut conn = manager.open();
//! conn.atomic(|conn| {
//!     let mut cur = conn.cursor()?;
//!     cur.execute("INSERT INTO items (name) VALUES (%s)", &Params::positional(["r1"]))?;
//!     Ok(())
//! })?;
//! conn.sync()?;
//! ```
//!
//! # Threads
//!
//! Share a [`ConnectionManager`] (it is `Clone + Send + Sync`) and open one
//! [`LibsqlConnection`] per worker.

pub mod config;
pub mod connection;
pub mod cursor;
pub mod errors;
pub mod features;
pub mod migrate;
pub mod operations;
pub mod placeholders;
pub mod schema;

pub use config::{
    ConnectionMode, ConnectionPlan, DatabaseSettings, ENV_AUTH_TOKEN, ENV_DATABASE_URL,
};
pub use connection::{
    ConnectionManager, LibsqlConnection, SYNC_NOT_IN_MEMORY, SYNC_REPLICA_ONLY, SyncOutcome,
};
pub use cursor::Cursor;
pub use errors::{NativeErrorClass, translate_native_error};
pub use features::{DatabaseFeatures, RETURNING_MIN_VERSION};
pub use migrate::{Migration, MigrationRunner, MigrationStatus};
pub use operations::DatabaseOperations;
pub use schema::SchemaEditor;

pub use libsql_backend_core::{Error, Params, Result, Row, Value};
pub use libsql_backend_sqlite::SqliteDriver;

/// Backend vendor name.
pub const VENDOR: &str = "libsql";
/// Human-readable backend name.
pub const DISPLAY_NAME: &str = "libSQL (Turso)";
