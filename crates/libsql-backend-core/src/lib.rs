//! Core types and traits for the libSQL backend.
//!
//! This crate provides the foundations shared by the adapter and native drivers:
//!
//! - `Value`, `Row` and `Params` for statement data
//! - `Error` taxonomy (configuration, integrity, operational, native)
//! - `NativeDriver` / `NativeConnection` / `NativeCursor`, the native driver boundary

pub mod error;
pub mod native;
pub mod params;
pub mod row;
pub mod value;

pub use error::{
    ConfigError, Error, IntegrityError, NativeError, OperationalError, OperationalErrorKind,
    Result, TypeError,
};
pub use native::{
    ConnectOptions, EngineVersion, NativeConnection, NativeCursor, NativeDriver, NativeResult,
};
pub use params::Params;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
