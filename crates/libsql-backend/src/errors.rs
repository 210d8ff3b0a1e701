//! Translation of native driver errors into the backend error taxonomy.
//!
//! Native drivers report failures as bare messages. This is the only place
//! in the adapter that inspects their text.

use libsql_backend_core::{
    Error, IntegrityError, NativeError, OperationalError, OperationalErrorKind,
};

/// Class of a recognized native failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorClass {
    /// Constraint violation (unique, foreign key, not null, check)
    Constraint,
    /// The remote stream backing the handle is gone
    StreamLost,
    /// Sync was attempted on a handle opened in Remote mode
    SyncRemoteMode,
    /// Sync was attempted on a handle opened in Memory mode
    SyncMemoryMode,
}

/// Marker substrings and their classes, checked in order.
const MARKERS: &[(&str, NativeErrorClass)] = &[
    ("SQLITE_CONSTRAINT", NativeErrorClass::Constraint),
    ("stream not found", NativeErrorClass::StreamLost),
    ("Hrana:", NativeErrorClass::StreamLost),
    (
        "not supported in databases opened in Remote mode",
        NativeErrorClass::SyncRemoteMode,
    ),
    (
        "not supported in databases opened in Memory mode",
        NativeErrorClass::SyncMemoryMode,
    ),
];

/// Classify a native error by the first marker its message contains.
pub fn classify(err: &NativeError) -> Option<NativeErrorClass> {
    MARKERS
        .iter()
        .find(|(marker, _)| err.contains(marker))
        .map(|(_, class)| *class)
}

/// Translate a native error raised while executing `sql`.
///
/// Callers must close the connection when the result
/// [`is_connection_lost`](Error::is_connection_lost).
pub fn translate_native_error(err: NativeError, sql: Option<&str>) -> Error {
    match classify(&err) {
        Some(NativeErrorClass::Constraint) => integrity(err, sql),
        Some(NativeErrorClass::StreamLost) => Error::Operational(OperationalError {
            kind: OperationalErrorKind::ConnectionLost,
            message: format!("Database connection lost: {}", err.message),
            source: Some(err),
        }),
        Some(NativeErrorClass::SyncRemoteMode | NativeErrorClass::SyncMemoryMode) | None => {
            Error::Native(err)
        }
    }
}

/// Translate a native error raised while fetching rows.
///
/// Only constraint violations are remapped; deferred constraint failures can
/// surface on the first fetch of a `RETURNING` statement.
pub fn translate_fetch_error(err: NativeError, sql: Option<&str>) -> Error {
    match classify(&err) {
        Some(NativeErrorClass::Constraint) => integrity(err, sql),
        _ => Error::Native(err),
    }
}

fn integrity(err: NativeError, sql: Option<&str>) -> Error {
    Error::Integrity(IntegrityError {
        message: err.message.clone(),
        sql: sql.map(str::to_string),
        source: Some(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(msg: &str) -> NativeError {
        NativeError::new(msg)
    }

    #[test]
    fn classifies_every_marker() {
        assert_eq!(
            classify(&native("SQLITE_CONSTRAINT_UNIQUE: UNIQUE constraint failed: t.name")),
            Some(NativeErrorClass::Constraint)
        );
        assert_eq!(
            classify(&native("SQLITE_CONSTRAINT_FOREIGNKEY: FOREIGN KEY constraint failed")),
            Some(NativeErrorClass::Constraint)
        );
        assert_eq!(
            classify(&native("Hrana: `stream error: stream not found`")),
            Some(NativeErrorClass::StreamLost)
        );
        assert_eq!(
            classify(&native("Hrana: api error: 502 Bad Gateway")),
            Some(NativeErrorClass::StreamLost)
        );
        assert_eq!(
            classify(&native("primary closed: stream not found")),
            Some(NativeErrorClass::StreamLost)
        );
        assert_eq!(classify(&native("SQLITE_ERROR: no such table: t")), None);
        assert_eq!(classify(&native("")), None);
    }

    #[test]
    fn classifies_sync_mode_refusals() {
        assert_eq!(
            classify(&native("sync not supported in databases opened in Remote mode")),
            Some(NativeErrorClass::SyncRemoteMode)
        );
        assert_eq!(
            classify(&native("sync not supported in databases opened in Memory mode")),
            Some(NativeErrorClass::SyncMemoryMode)
        );
        assert_eq!(
            classify(&native("sync not supported in databases opened in Local mode")),
            None
        );

        let err = translate_native_error(
            native("sync not supported in databases opened in Remote mode"),
            None,
        );
        assert!(matches!(err, Error::Native(_)));
    }

    #[test]
    fn constraint_wins_over_stream_marker() {
        let err = native("Hrana: SQLITE_CONSTRAINT_NOTNULL: NOT NULL constraint failed");
        assert_eq!(classify(&err), Some(NativeErrorClass::Constraint));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert_eq!(classify(&native("sqlite_constraint")), None);
        assert_eq!(classify(&native("Stream Not Found")), None);
    }

    #[test]
    fn constraint_becomes_integrity_error() {
        let err = translate_native_error(
            native("SQLITE_CONSTRAINT_UNIQUE: UNIQUE constraint failed: items.name"),
            Some("INSERT INTO items (name) VALUES (?)"),
        );
        assert!(err.is_integrity());
        assert_eq!(err.sql(), Some("INSERT INTO items (name) VALUES (?)"));
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[test]
    fn stream_loss_becomes_connection_lost() {
        let err = translate_native_error(native("Hrana: stream not found"), None);
        assert!(err.is_connection_lost());
        assert!(err.to_string().contains("Database connection lost: Hrana: stream not found"));
    }

    #[test]
    fn unknown_errors_pass_through() {
        let err = translate_native_error(native("SQLITE_ERROR: near \"SELEC\": syntax error"), None);
        match err {
            Error::Native(e) => assert_eq!(e.message, "SQLITE_ERROR: near \"SELEC\": syntax error"),
            other => panic!("expected native error, got {other:?}"),
        }
    }

    #[test]
    fn fetch_only_remaps_constraints() {
        let err = translate_fetch_error(native("SQLITE_CONSTRAINT_CHECK: CHECK constraint failed"), None);
        assert!(err.is_integrity());

        let err = translate_fetch_error(native("Hrana: stream not found"), None);
        assert!(matches!(err, Error::Native(_)));
    }
}
