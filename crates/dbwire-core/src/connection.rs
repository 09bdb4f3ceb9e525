//! Connection and transaction traits shared by every wire driver and the pool.

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// Transaction isolation level, as understood by `START TRANSACTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    #[default]
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Render the SQL clause used to set this level on the session.
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// A handle to a server-side (or client-side) prepared statement.
///
/// This is the driver-agnostic view: an opaque statement id, the SQL text it
/// was prepared from, how many parameters it binds, and the names of the
/// columns it will yield. Wire-level metadata needed to actually execute the
/// statement (column types, server capabilities) stays inside the driver,
/// keyed by `id()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    id: u64,
    sql: String,
    param_count: usize,
    column_names: Vec<String>,
}

impl PreparedStatement {
    /// Create a handle with no column metadata (text-protocol / DML statements).
    pub fn new(id: u64, sql: impl Into<String>, param_count: usize) -> Self {
        Self {
            id,
            sql: sql.into(),
            param_count,
            column_names: Vec::new(),
        }
    }

    /// Create a handle carrying result-set column names.
    pub fn with_columns(
        id: u64,
        sql: impl Into<String>,
        param_count: usize,
        column_names: Vec<String>,
    ) -> Self {
        Self {
            id,
            sql: sql.into(),
            param_count,
            column_names,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

/// A database connection.
///
/// All operations take a `Cx` for structured concurrency: callers can cancel
/// an in-flight operation and the driver is expected to unwind cleanly rather
/// than leave the connection in a half-read state.
pub trait Connection: Send + Sync {
    /// The transaction type this connection produces from `begin`/`begin_with`.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Execute an INSERT and return the last inserted ID.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send;

    /// Execute a batch of statements sequentially within one server round trip
    /// per statement, returning the affected-row count of each in order.
    ///
    /// Unlike a transaction, a batch does not roll back earlier statements if
    /// a later one fails; the caller gets the partial results via the error's
    /// context and decides what to do.
    fn batch(
        &self,
        cx: &Cx,
        statements: &[(String, Vec<Value>)],
    ) -> impl Future<Output = Outcome<Vec<u64>, Error>> + Send;

    /// Begin a transaction at the connection's default isolation level.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send;

    /// Begin a transaction at an explicit isolation level.
    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send;

    /// Prepare a statement for repeated execution.
    fn prepare(
        &self,
        cx: &Cx,
        sql: &str,
    ) -> impl Future<Output = Outcome<PreparedStatement, Error>> + Send;

    /// Execute a prepared statement and return all result rows.
    fn query_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a prepared statement and return the affected-row count.
    fn execute_prepared(
        &self,
        cx: &Cx,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Check whether the connection is still usable, issuing a lightweight
    /// round trip to the server (e.g. `COM_PING`).
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Close the connection, sending a graceful shutdown command if the wire
    /// protocol has one.
    fn close(self, cx: &Cx) -> impl Future<Output = Result<()>> + Send;
}

/// Operations available inside an open transaction.
///
/// `commit` and `rollback` consume `self`: once either resolves, the
/// transaction is over and the borrow it held on the connection is released.
/// Implementations should roll back on `Drop` if neither was called.
pub trait TransactionOps: Send + Sync + Sized {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a statement and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Establish a named savepoint within the transaction.
    fn savepoint(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back to a previously established savepoint.
    fn rollback_to(&self, cx: &Cx, name: &str)
    -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Release a previously established savepoint.
    fn release(&self, cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Commit the transaction.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back the transaction.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}
