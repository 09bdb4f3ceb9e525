//! Core types shared by every dbwire driver and the connection pool.
//!
//! - [`Connection`] / [`TransactionOps`] — the driver-agnostic async interface
//! - [`Value`] / [`Row`] — the in-memory data model a wire driver decodes into
//! - [`Error`] and friends — the SQLSTATE-aware error taxonomy drivers map onto
//! - `Outcome` / `Cx` re-exported from `asupersync` for cancel-correct operations

pub use asupersync::{Budget, Cx, Outcome, RegionId, TaskId};

pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use connection::{Connection, IsolationLevel, PreparedStatement, TransactionOps};
pub use error::{
    ConnectionError, ConnectionErrorKind, Error, PoolError, PoolErrorKind, ProtocolError,
    QueryError, QueryErrorKind, Result, SchemaError, SchemaErrorKind, SqlStateClass,
    TransactionError, TransactionErrorKind, TypeError,
};
pub use row::Row;
pub use value::Value;
