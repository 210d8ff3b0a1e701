//! Type encoding and decoding between backend values and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL).
//! Booleans bind as INTEGER 0/1 and JSON documents bind as TEXT.

#![allow(clippy::cast_possible_truncation)]

use crate::ffi;
use libsql_backend_core::{NativeError, NativeResult, Params, Value};
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees stmt and index; buffers are copied (SQLITE_TRANSIENT)
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, if *b { 1 } else { 0 }),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => bind_text(stmt, index, s),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            ),
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, s: &str) -> c_int {
    let bytes = s.as_bytes();
    // SAFETY: caller guarantees stmt and index
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind a full parameter set to a freshly prepared statement.
///
/// Positional parameters must match the statement's parameter count exactly.
/// Named parameters are resolved per statement parameter (`:name`, `@name`
/// or `$name`); every parameter the statement uses must be supplied, extra
/// keys are ignored.
///
/// # Safety
/// `stmt` must be a valid, non-null prepared statement handle.
pub unsafe fn bind_params(stmt: *mut ffi::sqlite3_stmt, params: &Params) -> NativeResult<()> {
    // SAFETY: stmt is valid per the caller
    let expected = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };

    match params {
        Params::None | Params::Positional(_) => {
            let values: &[Value] = match params {
                Params::Positional(values) => values,
                _ => &[],
            };
            if values.len() != expected as usize {
                return Err(NativeError::new(format!(
                    "Incorrect number of bindings supplied. The current statement uses {}, and there are {} supplied.",
                    expected,
                    values.len()
                )));
            }
            for (i, value) in values.iter().enumerate() {
                let index = (i + 1) as c_int;
                // SAFETY: index is within 1..=expected
                let rc = unsafe { bind_value(stmt, index, value) };
                if rc != ffi::SQLITE_OK {
                    return Err(bind_failure(index, rc));
                }
            }
        }
        Params::Named(_) => {
            for index in 1..=expected {
                // SAFETY: index is within 1..=expected
                let name = unsafe { parameter_name(stmt, index) }.ok_or_else(|| {
                    NativeError::new(format!(
                        "Binding {} has no name, but named parameters were supplied.",
                        index
                    ))
                })?;
                let key = name.trim_start_matches([':', '@', '$']);
                let value = params.get_named(key).ok_or_else(|| {
                    NativeError::new(format!(
                        "You did not supply a value for binding parameter {}.",
                        name
                    ))
                })?;
                // SAFETY: index is within 1..=expected
                let rc = unsafe { bind_value(stmt, index, value) };
                if rc != ffi::SQLITE_OK {
                    return Err(bind_failure(index, rc));
                }
            }
        }
    }
    Ok(())
}

fn bind_failure(index: c_int, rc: c_int) -> NativeError {
    NativeError::new(format!(
        "{}: Failed to bind parameter {}: {}",
        ffi::code_name(rc),
        index,
        ffi::error_string(rc)
    ))
}

unsafe fn parameter_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt and index
    let ptr = unsafe { ffi::sqlite3_bind_parameter_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null pointer to a NUL-terminated string owned by stmt
        unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees a current row and a valid column index
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_NULL => Value::Null,

            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                // Choose the smallest representation
                match i32::try_from(v) {
                    Ok(small) => Value::Int(small),
                    Err(_) => Value::BigInt(v),
                }
            }

            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),

            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }

            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(slice.to_vec())
                }
            }

            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt and index
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null pointer to a NUL-terminated string owned by stmt
        unsafe { CStr::from_ptr(ptr) }.to_str().ok().map(String::from)
    }
}
