//! Low-level FFI bindings to libsqlite3.
//!
//! Re-exports the subset of `libsqlite3-sys` the driver uses, plus a few
//! helpers for version and error-code reporting.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use std::ffi::{CStr, c_int};

pub use libsqlite3_sys::{
    SQLITE_BLOB, SQLITE_DONE, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_NULL, SQLITE_OK,
    SQLITE_OPEN_CREATE, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI, SQLITE_ROW,
    SQLITE_TEXT, SQLITE_TRANSIENT, sqlite3, sqlite3_backup_finish, sqlite3_backup_init,
    sqlite3_backup_step, sqlite3_bind_blob, sqlite3_bind_double, sqlite3_bind_int,
    sqlite3_bind_int64, sqlite3_bind_null, sqlite3_bind_parameter_count,
    sqlite3_bind_parameter_name, sqlite3_bind_text, sqlite3_busy_timeout, sqlite3_changes,
    sqlite3_close, sqlite3_column_blob, sqlite3_column_bytes, sqlite3_column_count,
    sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name, sqlite3_column_text,
    sqlite3_column_type, sqlite3_errmsg, sqlite3_errstr, sqlite3_exec,
    sqlite3_extended_errcode, sqlite3_finalize, sqlite3_free, sqlite3_get_autocommit,
    sqlite3_last_insert_rowid, sqlite3_libversion, sqlite3_libversion_number, sqlite3_open_v2,
    sqlite3_prepare_v2, sqlite3_step, sqlite3_stmt, sqlite3_stmt_readonly,
};

// Primary result codes used when naming errors.
pub const SQLITE_ERROR: c_int = 1;
pub const SQLITE_INTERNAL: c_int = 2;
pub const SQLITE_PERM: c_int = 3;
pub const SQLITE_ABORT: c_int = 4;
pub const SQLITE_BUSY: c_int = 5;
pub const SQLITE_LOCKED: c_int = 6;
pub const SQLITE_NOMEM: c_int = 7;
pub const SQLITE_READONLY: c_int = 8;
pub const SQLITE_INTERRUPT: c_int = 9;
pub const SQLITE_IOERR: c_int = 10;
pub const SQLITE_CORRUPT: c_int = 11;
pub const SQLITE_FULL: c_int = 13;
pub const SQLITE_CANTOPEN: c_int = 14;
pub const SQLITE_SCHEMA: c_int = 17;
pub const SQLITE_TOOBIG: c_int = 18;
pub const SQLITE_CONSTRAINT: c_int = 19;
pub const SQLITE_MISMATCH: c_int = 20;
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_AUTH: c_int = 23;
pub const SQLITE_RANGE: c_int = 25;
pub const SQLITE_NOTADB: c_int = 26;

// Extended constraint codes.
pub const SQLITE_CONSTRAINT_CHECK: c_int = SQLITE_CONSTRAINT | (1 << 8);
pub const SQLITE_CONSTRAINT_FOREIGNKEY: c_int = SQLITE_CONSTRAINT | (3 << 8);
pub const SQLITE_CONSTRAINT_NOTNULL: c_int = SQLITE_CONSTRAINT | (5 << 8);
pub const SQLITE_CONSTRAINT_PRIMARYKEY: c_int = SQLITE_CONSTRAINT | (6 << 8);
pub const SQLITE_CONSTRAINT_UNIQUE: c_int = SQLITE_CONSTRAINT | (8 << 8);

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// Symbolic name of a (possibly extended) result code, e.g. `SQLITE_CONSTRAINT_UNIQUE`.
pub fn code_name(code: c_int) -> &'static str {
    match code {
        SQLITE_CONSTRAINT_CHECK => "SQLITE_CONSTRAINT_CHECK",
        SQLITE_CONSTRAINT_FOREIGNKEY => "SQLITE_CONSTRAINT_FOREIGNKEY",
        SQLITE_CONSTRAINT_NOTNULL => "SQLITE_CONSTRAINT_NOTNULL",
        SQLITE_CONSTRAINT_PRIMARYKEY => "SQLITE_CONSTRAINT_PRIMARYKEY",
        SQLITE_CONSTRAINT_UNIQUE => "SQLITE_CONSTRAINT_UNIQUE",
        _ => match code & 0xff {
            SQLITE_OK => "SQLITE_OK",
            SQLITE_ERROR => "SQLITE_ERROR",
            SQLITE_INTERNAL => "SQLITE_INTERNAL",
            SQLITE_PERM => "SQLITE_PERM",
            SQLITE_ABORT => "SQLITE_ABORT",
            SQLITE_BUSY => "SQLITE_BUSY",
            SQLITE_LOCKED => "SQLITE_LOCKED",
            SQLITE_NOMEM => "SQLITE_NOMEM",
            SQLITE_READONLY => "SQLITE_READONLY",
            SQLITE_INTERRUPT => "SQLITE_INTERRUPT",
            SQLITE_IOERR => "SQLITE_IOERR",
            SQLITE_CORRUPT => "SQLITE_CORRUPT",
            SQLITE_FULL => "SQLITE_FULL",
            SQLITE_CANTOPEN => "SQLITE_CANTOPEN",
            SQLITE_SCHEMA => "SQLITE_SCHEMA",
            SQLITE_TOOBIG => "SQLITE_TOOBIG",
            SQLITE_CONSTRAINT => "SQLITE_CONSTRAINT",
            SQLITE_MISMATCH => "SQLITE_MISMATCH",
            SQLITE_MISUSE => "SQLITE_MISUSE",
            SQLITE_AUTH => "SQLITE_AUTH",
            SQLITE_RANGE => "SQLITE_RANGE",
            SQLITE_NOTADB => "SQLITE_NOTADB",
            _ => "SQLITE_UNKNOWN",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(v.starts_with('3'));
    }

    #[test]
    fn test_version_number() {
        // SQLite 3.x.x version numbers are in the form 3XXXYYY
        assert!(version_number() >= 3_000_000);
    }

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(SQLITE_OK), "not an error");
        assert_eq!(error_string(SQLITE_BUSY), "database is locked");
        assert_eq!(error_string(SQLITE_CONSTRAINT), "constraint failed");
    }

    #[test]
    fn test_code_names() {
        assert_eq!(code_name(SQLITE_CONSTRAINT_UNIQUE), "SQLITE_CONSTRAINT_UNIQUE");
        assert_eq!(code_name(2067), "SQLITE_CONSTRAINT_UNIQUE");
        assert_eq!(code_name(SQLITE_CONSTRAINT), "SQLITE_CONSTRAINT");
        assert_eq!(code_name(SQLITE_ERROR), "SQLITE_ERROR");
        // SQLITE_IOERR_READ is an extended I/O code
        assert_eq!(code_name(SQLITE_IOERR | (1 << 8)), "SQLITE_IOERR");
    }
}
