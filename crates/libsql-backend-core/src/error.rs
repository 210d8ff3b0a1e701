//! Error types for libSQL backend operations.
//!
//! Native driver failures arrive as [`NativeError`] (plain message text).
//! The adapter classifies them into [`IntegrityError`] and
//! [`OperationalError`]; anything it does not recognize is carried through
//! unchanged as [`Error::Native`].

use std::fmt;

/// The primary error type for all backend operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid or contradictory connection settings
    Config(ConfigError),
    /// Constraint violation reported by the engine
    Integrity(IntegrityError),
    /// Connection loss and sync failures
    Operational(OperationalError),
    /// Native driver error the adapter did not translate
    Native(NativeError),
    /// Misuse of the parameter API (unknown placeholder names, etc.)
    Programming(String),
    /// Type conversion errors while decoding rows
    Type(TypeError),
    /// I/O errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// An error reported by a native driver.
///
/// Native drivers only guarantee a message. Classification happens by
/// matching well-known markers inside that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Does the message contain `marker`?
    pub fn contains(&self, marker: &str) -> bool {
        self.message.contains(marker)
    }
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

#[derive(Debug)]
pub struct IntegrityError {
    pub message: String,
    /// Statement that triggered the violation, when known
    pub sql: Option<String>,
    pub source: Option<NativeError>,
}

#[derive(Debug)]
pub struct OperationalError {
    pub kind: OperationalErrorKind,
    pub message: String,
    pub source: Option<NativeError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalErrorKind {
    /// The remote stream/session was lost; the connection has been closed
    ConnectionLost,
    /// Manual sync requested on a connection that cannot sync
    SyncUnavailable,
    /// The native sync call failed
    SyncFailed,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build an [`Error::Operational`] without a native source.
    pub fn operational(kind: OperationalErrorKind, message: impl Into<String>) -> Self {
        Error::Operational(OperationalError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build an [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError::new(message))
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }

    /// Did this error close the connection?
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Error::Operational(OperationalError {
                kind: OperationalErrorKind::ConnectionLost,
                ..
            })
        )
    }

    pub fn operational_kind(&self) -> Option<OperationalErrorKind> {
        match self {
            Error::Operational(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Integrity(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Integrity(e) => write!(f, "Integrity error: {}", e.message),
            Error::Operational(e) => write!(f, "Operational error: {}", e.message),
            Error::Native(e) => write!(f, "{}", e.message),
            Error::Programming(msg) => write!(f, "Programming error: {}", msg),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Integrity(e) => e
                .source
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Operational(e) => e
                .source
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NativeError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for OperationalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Error::Native(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<IntegrityError> for Error {
    fn from(err: IntegrityError) -> Self {
        Error::Integrity(err)
    }
}

impl From<OperationalError> for Error {
    fn from(err: OperationalError) -> Self {
        Error::Operational(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, Error>;
