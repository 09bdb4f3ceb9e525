//! Error types for dbwire operations.
//!
//! The taxonomy mirrors where a failure actually happened in the stack:
//! transport (`Connection`, `Protocol`), server response (`Query`), local
//! decoding (`Type`), transaction/pool bookkeeping, and schema operations.
//! Every leaf error keeps an optional `source` so the original `io::Error`
//! or parse failure survives for logging, plus enough server-supplied
//! context (SQLSTATE, vendor code, offending SQL) to build actionable
//! diagnostics without re-parsing the message string.

use std::fmt;

/// The primary error type for all dbwire operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect, timeout, TLS)
    Connection(ConnectionError),
    /// Wire-protocol framing/decoding errors (malformed packets, unexpected bytes)
    Protocol(ProtocolError),
    /// Query execution errors, including server-reported failures
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Pool errors
    Pool(PoolError),
    /// Schema/migration errors
    Schema(SchemaError),
    /// Serialization/deserialization errors
    Serde(String),
    /// An operation's deadline elapsed before it completed
    Timeout,
    /// Unexpected end of stream while more bytes were expected
    Eof {
        /// How many bytes the caller was trying to read
        expected: usize,
        /// How many bytes were actually available before the stream closed
        got: usize,
    },
    /// A packet exceeded the negotiated `max_allowed_packet` size
    PacketTooBig {
        /// The size that was about to be sent or that was announced by the server
        len: usize,
        /// The configured ceiling
        max: usize,
    },
    /// A batch of statements failed partway through.
    ///
    /// `counts` holds the affected-row count of every statement that
    /// completed before the failure; `cause` is the error the failing
    /// statement raised.
    BatchUpdateError {
        counts: Vec<u64>,
        cause: Box<Error>,
    },
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish a TCP connection (DNS, refused, etc.)
    Connect,
    /// The remote end actively refused the connection
    Refused,
    /// Connection was closed unexpectedly mid-operation
    Disconnected,
    /// Authentication with the server failed
    Authentication,
    /// SSL/TLS negotiation failed
    Ssl,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    /// The raw bytes that failed to parse, when available, for diagnostics.
    pub raw_data: Option<Vec<u8>>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// Five-character SQLSTATE the server reported, if any.
    pub sqlstate: Option<String>,
    /// The driver-native numeric error code the server reported (MySQL's
    /// `ER_xxx` codes), if any.
    pub vendor_code: Option<u16>,
    /// The SQL text that produced this error, if captured by the caller.
    pub sql: Option<String>,
    /// A truncated snapshot of the bound parameters, for diagnostics.
    /// Truncated to a fixed number of entries so a pathological batch
    /// doesn't balloon an error's Debug output.
    pub params: Option<Vec<String>>,
    /// Extra server-supplied detail (e.g. constraint name).
    pub detail: Option<String>,
    /// A suggestion for how to resolve the error.
    pub hint: Option<String>,
    /// Character offset into `sql` the server pointed at, if any.
    pub position: Option<usize>,
    /// Which packet this error was decoded from, for protocol diagnostics
    /// (e.g. `"handshake"`, `"stmt_execute"`, `"result_row"`).
    pub packet_origin: Option<&'static str>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// Maximum number of parameters kept in a [`QueryError::params`] snapshot.
pub const MAX_PARAM_SNAPSHOT: usize = 16;

/// Render a parameter snapshot, truncating to [`MAX_PARAM_SNAPSHOT`] entries.
#[must_use]
pub fn snapshot_params(values: &[String]) -> Vec<String> {
    if values.len() <= MAX_PARAM_SNAPSHOT {
        values.to_vec()
    } else {
        let mut snap: Vec<String> = values[..MAX_PARAM_SNAPSHOT].to_vec();
        snap.push(format!("… ({} more)", values.len() - MAX_PARAM_SNAPSHOT));
        snap
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Query timeout
    Timeout,
    /// Transient failure the caller may retry (connection loss mid-query, deadlock)
    Transient,
    /// Data exception (invalid value, out-of-range, division by zero)
    Data,
    /// Feature not supported by the server
    Unsupported,
    /// Other execution error
    Execution,
}

impl QueryError {
    /// Classify this error by the prefix of its SQLSTATE, per the standard
    /// class codes (`08` connection exception, `22` data exception, `23`
    /// integrity constraint violation, `28` invalid authorization, `40`
    /// transaction rollback, `42` syntax or access rule violation, `0A`
    /// feature not supported). Falls back to `NonTransient` when the
    /// SQLSTATE is absent or unrecognized.
    #[must_use]
    pub fn sqlstate_class(&self) -> SqlStateClass {
        match self.sqlstate.as_deref() {
            Some(s) if s.starts_with("08") => SqlStateClass::Transient,
            Some(s) if s.starts_with("22") => SqlStateClass::Data,
            Some(s) if s.starts_with("23") => SqlStateClass::IntegrityConstraint,
            Some(s) if s.starts_with("28") => SqlStateClass::InvalidAuthorizationSpec,
            Some(s) if s.starts_with("40") => SqlStateClass::TransactionRollback,
            Some(s) if s.starts_with("42") => SqlStateClass::SyntaxOrAccess,
            Some(s) if s.starts_with("0A") => SqlStateClass::FeatureNotSupported,
            _ => SqlStateClass::NonTransient,
        }
    }
}

/// SQLSTATE-prefix classification of a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStateClass {
    Transient,
    Data,
    IntegrityConstraint,
    InvalidAuthorizationSpec,
    TransactionRollback,
    SyntaxOrAccess,
    FeatureNotSupported,
    NonTransient,
}

#[derive(Debug)]
pub struct TypeError {
    /// What type (or shape) the caller expected.
    pub expected: &'static str,
    /// What was actually found, rendered as text.
    pub actual: String,
    /// The column involved, if known.
    pub column: Option<String>,
    /// The target Rust type being converted into, if relevant.
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Transaction already started
    AlreadyStarted,
    /// No active transaction
    NoTransaction,
    /// Commit failed
    CommitFailed,
    /// Rollback failed
    RollbackFailed,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure
    Serialization,
}

#[derive(Debug)]
pub struct PoolError {
    pub kind: PoolErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// Pool exhausted (no available connections)
    Exhausted,
    /// Connection checkout timeout
    Timeout,
    /// Pool is closed
    Closed,
    /// Configuration error
    Config,
    /// A checked-out connection was never returned within the leak threshold
    Leak,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table already exists
    TableExists,
    /// Table not found
    TableNotFound,
    /// Column already exists
    ColumnExists,
    /// Column not found
    ColumnNotFound,
    /// Invalid schema definition
    Invalid,
    /// Migration error
    Migration,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "connection error: {}", e.message),
            Error::Protocol(e) => write!(f, "protocol error: {}", e.message),
            Error::Query(e) => {
                if let Some(sql) = &e.sql {
                    write!(f, "query error: {} (SQL: {})", e.message, sql)
                } else {
                    write!(f, "query error: {}", e.message)
                }
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "transaction error: {}", e.message),
            Error::Pool(e) => write!(f, "pool error: {}", e.message),
            Error::Schema(e) => write!(f, "schema error: {}", e.message),
            Error::Serde(msg) => write!(f, "serialization error: {}", msg),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Eof { expected, got } => {
                write!(f, "unexpected end of stream: wanted {} bytes, got {}", expected, got)
            }
            Error::PacketTooBig { len, max } => {
                write!(f, "packet of {} bytes exceeds max_allowed_packet of {} bytes", len, max)
            }
            Error::BatchUpdateError { counts, cause } => {
                write!(
                    f,
                    "batch failed after {} statement(s) succeeded: {}",
                    counts.len(),
                    cause
                )
            }
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::Protocol(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::Pool(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::Schema(e) => e.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static)),
            Error::BatchUpdateError { cause, .. } => Some(&**cause),
            _ => None,
        }
    }
}

/// Result type alias for dbwire operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classification() {
        let mk = |state: &str| QueryError {
            kind: QueryErrorKind::Execution,
            message: String::new(),
            sqlstate: Some(state.to_string()),
            vendor_code: None,
            sql: None,
            params: None,
            detail: None,
            hint: None,
            position: None,
            packet_origin: None,
            source: None,
        };

        assert_eq!(mk("08S01").sqlstate_class(), SqlStateClass::Transient);
        assert_eq!(mk("23000").sqlstate_class(), SqlStateClass::IntegrityConstraint);
        assert_eq!(mk("42S02").sqlstate_class(), SqlStateClass::SyntaxOrAccess);
        assert_eq!(mk("HY000").sqlstate_class(), SqlStateClass::NonTransient);
    }

    #[test]
    fn batch_update_error_reports_partial_counts() {
        let err = Error::BatchUpdateError {
            counts: vec![1, 1],
            cause: Box::new(Error::Custom("duplicate key".into())),
        };
        assert!(err.to_string().contains("2 statement"));
    }
}
