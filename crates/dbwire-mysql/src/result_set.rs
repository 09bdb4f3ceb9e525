//! Result-set abstractions layered on top of the wire driver.
//!
//! [`MaterializedResultSet`] holds every row in memory and supports both
//! forward-only iteration and scroll-insensitive positioning. [`StreamingResultSet`]
//! instead keeps a server-side cursor open (`COM_STMT_EXECUTE` with
//! `CURSOR_TYPE_READ_ONLY`) and pulls rows in batches via `COM_STMT_FETCH`,
//! for result sets too large to materialize up front.

use std::sync::Arc;

use asupersync::sync::Mutex;
use asupersync::{Cx, Outcome};

use dbwire_core::connection::PreparedStatement;
use dbwire_core::{Error, Row};

use crate::async_connection::MySqlAsyncConnection;
use crate::types::ColumnDef;

/// A fully materialized, scroll-insensitive result set.
///
/// Cursor position is 1-based, following the JDBC `ResultSet` convention:
/// position `0` means "before the first row", position `len() + 1` means
/// "after the last row". All rows already live in memory, so moving the
/// cursor in either direction is just an index update.
#[derive(Debug, Clone)]
pub struct MaterializedResultSet {
    rows: Vec<Row>,
    cursor: usize,
}

impl MaterializedResultSet {
    /// Wrap a fully-read row set, cursor positioned before the first row.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, cursor: 0 }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The row at the current cursor position, if the cursor is on a row.
    #[must_use]
    pub fn current(&self) -> Option<&Row> {
        if self.cursor >= 1 && self.cursor <= self.rows.len() {
            self.rows.get(self.cursor - 1)
        } else {
            None
        }
    }

    /// Advance one row. Returns `false` once moved past the last row.
    pub fn next(&mut self) -> bool {
        if self.cursor <= self.rows.len() {
            self.cursor += 1;
        }
        self.cursor >= 1 && self.cursor <= self.rows.len()
    }

    /// Move back one row. Returns `false` once moved before the first row.
    pub fn previous(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.cursor >= 1 && self.cursor <= self.rows.len()
    }

    /// Move to a 1-based absolute position. A negative position counts from
    /// the end (`-1` is the last row). Returns whether the cursor landed on
    /// an actual row.
    pub fn absolute(&mut self, position: i64) -> bool {
        let len = self.rows.len() as i64;
        let target = if position < 0 { len + position + 1 } else { position };
        if target < 1 {
            self.cursor = 0;
            false
        } else if target > len {
            self.cursor = self.rows.len() + 1;
            false
        } else {
            self.cursor = target as usize;
            true
        }
    }

    /// Move relative to the current position.
    pub fn relative(&mut self, offset: i64) -> bool {
        self.absolute(self.cursor as i64 + offset)
    }

    pub fn first(&mut self) -> bool {
        self.absolute(1)
    }

    pub fn last(&mut self) -> bool {
        self.absolute(-1)
    }

    pub fn before_first(&mut self) {
        self.cursor = 0;
    }

    pub fn after_last(&mut self) {
        self.cursor = self.rows.len() + 1;
    }

    #[must_use]
    pub fn is_before_first(&self) -> bool {
        self.cursor == 0
    }

    #[must_use]
    pub fn is_after_last(&self) -> bool {
        self.cursor == self.rows.len() + 1
    }

    #[must_use]
    pub fn row_number(&self) -> usize {
        self.cursor
    }
}

/// Streaming-cursor state. Named after the three states a fetch-backed
/// result set can be in: it either needs a fresh `COM_STMT_FETCH` batch,
/// has one buffered with a read position into it, or has been closed
/// server-side.
enum StreamState {
    NeedsFetch,
    HaveBatch(Vec<Row>, usize),
    Closed,
}

/// A streaming result set backed by a server-side cursor.
///
/// Rows are pulled in batches of `fetch_size` as `next` is called. When the
/// last batch is drained, any remaining buffered rows are still returned
/// before the cursor reports exhaustion; `COM_STMT_CLOSE` is issued exactly
/// once, as soon as the server signals there is nothing left to fetch (it is
/// not deferred to `Drop`, since closing eagerly bounds how long the
/// statement ties up server-side resources).
pub struct StreamingResultSet {
    conn: Arc<Mutex<MySqlAsyncConnection>>,
    stmt: PreparedStatement,
    columns: Vec<ColumnDef>,
    fetch_size: u32,
    state: StreamState,
    server_exhausted: bool,
    close_sent: bool,
}

impl StreamingResultSet {
    pub(crate) fn new(
        conn: Arc<Mutex<MySqlAsyncConnection>>,
        stmt: PreparedStatement,
        columns: Vec<ColumnDef>,
        fetch_size: u32,
    ) -> Self {
        Self {
            conn,
            stmt,
            columns,
            fetch_size,
            state: StreamState::NeedsFetch,
            server_exhausted: false,
            close_sent: false,
        }
    }

    /// The column metadata for this result set.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Advance to the next row, fetching another batch from the server when
    /// the buffered one runs out.
    ///
    /// Returns `Ok(None)` once every row (including the tail of a partial
    /// final batch) has been returned; at that point the cursor has already
    /// been closed server-side.
    pub async fn next(&mut self, cx: &Cx) -> Outcome<Option<Row>, Error> {
        loop {
            match &mut self.state {
                StreamState::Closed => return Outcome::Ok(None),
                StreamState::HaveBatch(rows, idx) => {
                    if *idx < rows.len() {
                        let row = rows[*idx].clone();
                        *idx += 1;
                        return Outcome::Ok(Some(row));
                    }
                    if self.server_exhausted {
                        self.state = StreamState::Closed;
                        return match self.close(cx).await {
                            Outcome::Ok(()) => Outcome::Ok(None),
                            Outcome::Err(e) => Outcome::Err(e),
                            Outcome::Cancelled(r) => Outcome::Cancelled(r),
                            Outcome::Panicked(p) => Outcome::Panicked(p),
                        };
                    }
                    self.state = StreamState::NeedsFetch;
                }
                StreamState::NeedsFetch => {
                    let mut guard = self.conn.lock(cx).await;
                    let (rows, exhausted) = match guard
                        .fetch_async(cx, &self.stmt, &self.columns, self.fetch_size)
                        .await
                    {
                        Outcome::Ok(r) => r,
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    };
                    drop(guard);
                    self.server_exhausted = exhausted;
                    if rows.is_empty() {
                        self.state = StreamState::Closed;
                        return match self.close(cx).await {
                            Outcome::Ok(()) => Outcome::Ok(None),
                            Outcome::Err(e) => Outcome::Err(e),
                            Outcome::Cancelled(r) => Outcome::Cancelled(r),
                            Outcome::Panicked(p) => Outcome::Panicked(p),
                        };
                    }
                    self.state = StreamState::HaveBatch(rows, 0);
                }
            }
        }
    }

    /// Close the server-side cursor. Safe to call more than once or after
    /// exhaustion already triggered it; only the first call sends
    /// `COM_STMT_CLOSE`.
    pub async fn close(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.state = StreamState::Closed;
        if self.close_sent {
            return Outcome::Ok(());
        }
        self.close_sent = true;
        let mut guard = self.conn.lock(cx).await;
        guard.close_prepared_async(&self.stmt).await;
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbwire_core::Value;

    fn sample_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec!["id".to_string()], vec![Value::Int(i as i32)]))
            .collect()
    }

    #[test]
    fn materialized_forward_only_iteration() {
        let mut rs = MaterializedResultSet::new(sample_rows(3));
        assert!(rs.is_before_first());
        assert!(rs.next());
        assert_eq!(rs.row_number(), 1);
        assert!(rs.next());
        assert!(rs.next());
        assert!(!rs.next());
        assert!(rs.is_after_last());
    }

    #[test]
    fn materialized_scroll_positioning() {
        let mut rs = MaterializedResultSet::new(sample_rows(5));
        assert!(rs.last());
        assert_eq!(rs.row_number(), 5);
        assert!(rs.absolute(2));
        assert_eq!(rs.row_number(), 2);
        assert!(rs.absolute(-1));
        assert_eq!(rs.row_number(), 5);
        assert!(!rs.absolute(0));
        assert!(rs.is_before_first());
        assert!(!rs.absolute(100));
        assert!(rs.is_after_last());
    }

    #[test]
    fn materialized_empty_result_set() {
        let mut rs = MaterializedResultSet::new(Vec::new());
        assert!(rs.is_empty());
        assert!(!rs.next());
        assert!(rs.current().is_none());
    }
}
