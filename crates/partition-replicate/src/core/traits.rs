//! Core traits for database-agnostic replication.
//!
//! - [`Connection`]: One exclusively-owned database connection
//! - [`ConnectionFactory`]: Opens connections for a [`ConnectionRole`]
//! - [`Dialect`]: SQL syntax strategy for different database engines
//!
//! # Design Patterns
//!
//! - **Abstract Factory**: `ConnectionFactory` hides how drivers connect
//! - **Strategy**: `Dialect` provides interchangeable SQL fragments

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::{ReplicateError, Result};

use super::partition::ConnectionRole;
use super::value::Row;

/// A prepared statement with its bound parameter values.
///
/// Drivers keep their native prepared handle internally, keyed by SQL text;
/// this value carries the SQL and the text parameters to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<Option<String>>,
}

impl Statement {
    /// Create a statement expecting `param_count` parameters, all unbound (NULL).
    pub fn new(sql: impl Into<String>, param_count: usize) -> Self {
        Self {
            sql: sql.into(),
            params: vec![None; param_count],
        }
    }

    /// Bind a text value to the 1-based parameter slot.
    pub fn bind(&mut self, index: usize, value: Option<String>) -> Result<()> {
        let count = self.params.len();
        match index.checked_sub(1).and_then(|i| self.params.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ReplicateError::preparation(format!(
                "parameter index {} out of range (statement has {} parameters)",
                index, count
            ))),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Option<String>] {
        &self.params
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// Forward-only, single-pass cursor over query results.
///
/// Rows are pulled lazily from the driver; the cursor borrows the connection
/// that produced it, so the connection cannot be reused or closed while the
/// cursor is alive.
pub struct RowCursor<'a> {
    stream: BoxStream<'a, Result<Row>>,
    finished: bool,
    rows_fetched: u64,
}

impl<'a> RowCursor<'a> {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Row>> + Send + 'a,
    {
        Self {
            stream: stream.boxed(),
            finished: false,
            rows_fetched: 0,
        }
    }

    /// Fetch the next row, `Ok(None)` once the result set is exhausted.
    ///
    /// After exhaustion or an error every further call returns `Ok(None)`.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(Ok(row)) => {
                self.rows_fetched += 1;
                Ok(Some(row))
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Rows produced so far.
    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }
}

impl std::fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("finished", &self.finished)
            .field("rows_fetched", &self.rows_fetched)
            .finish()
    }
}

/// A single database connection serving one role.
///
/// A connection is owned by exactly one reader or writer and is never shared
/// across partitions. `close` consumes it, so it is released at most once.
#[async_trait]
pub trait Connection: Send {
    /// Role this connection was opened for.
    fn role(&self) -> ConnectionRole;

    /// Execute a statement with no result set (session settings).
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Prepare a statement, returning it with every parameter unbound.
    async fn prepare(&mut self, sql: &str) -> Result<Statement>;

    /// Execute a prepared query and stream its rows.
    async fn query<'a>(&'a mut self, statement: &Statement) -> Result<RowCursor<'a>>;

    /// Execute a prepared statement once per row, binding each row's values
    /// positionally. Returns the number of rows affected.
    async fn execute_batch(&mut self, statement: &Statement, rows: &[Row]) -> Result<u64>;

    /// Start an explicit transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens connections for either side of the replication.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, role: ConnectionRole) -> Result<Box<dyn Connection>>;
}

/// Session configuration steps, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStep {
    /// Use `.` as the decimal separator when rendering and parsing numbers.
    NumericFormat,
    /// Render and parse dates as `YYYY-MM-DD HH24:MI:SS`.
    DateFormat,
    /// Render and parse timestamps with fractional seconds in a fixed time
    /// zone, so zoned timestamps carry the same offset on both ends.
    TimestampFormat,
    /// Favor full physical scans over index access. Only applied for full scans.
    FullScan,
}

impl SessionStep {
    /// Every step in application order.
    pub const ORDER: [SessionStep; 4] = [
        SessionStep::NumericFormat,
        SessionStep::DateFormat,
        SessionStep::TimestampFormat,
        SessionStep::FullScan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SessionStep::NumericFormat => "numeric format",
            SessionStep::DateFormat => "date format",
            SessionStep::TimestampFormat => "timestamp format",
            SessionStep::FullScan => "full scan",
        }
    }
}

/// What the partition hash is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashTarget<'a> {
    /// The physical row address of a base table.
    PhysicalRow,
    /// The whole row of a derived table with the given alias.
    DerivedRow { alias: &'a str },
}

/// SQL dialect abstraction.
///
/// Provides database-specific SQL fragments while keeping the partitioned
/// read and batched write logic database-agnostic.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mssql", "postgres").
    fn name(&self) -> &str;

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// - MSSQL: `@P1`, `@P2`, etc.
    /// - PostgreSQL: `$1`, `$2`, etc.
    fn param_placeholder(&self, index: usize) -> String;

    /// Statement applying one session step, `None` if the engine needs none.
    fn session_statement(&self, step: SessionStep) -> Option<String>;

    /// Expression evaluating to `hash(target) mod total_partitions`, always
    /// in `[0, total_partitions)`.
    fn partition_hash(&self, target: HashTarget<'_>, total_partitions: u32) -> String;

    /// Alias given to a wrapped query.
    fn derived_table_alias(&self) -> &str {
        "src"
    }

    /// Optimizer hint placed right after `SELECT` on full scans.
    fn full_scan_select_hint(&self, _table: &str) -> Option<String> {
        None
    }

    /// Hint placed right after the table name on full scans.
    fn full_scan_table_hint(&self) -> Option<String> {
        None
    }

    /// Direct-path hint placed right after the INSERT target table.
    fn bulk_insert_hint(&self) -> Option<String> {
        None
    }

    fn begin_transaction_sql(&self) -> &str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &str {
        "ROLLBACK"
    }
}
