//! In-memory connection used by unit tests.
//!
//! Source queries return the rows whose first column (an integer id) falls
//! in the bound partition, using `id % N` where `N` is read back out of the
//! generated PostgreSQL predicate. Every call is recorded per connection so
//! tests can assert on ordering, and individual steps can be made to fail.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::core::traits::{Connection, ConnectionFactory, RowCursor, Statement};
use crate::core::{ConnectionRole, Row};
use crate::error::{ReplicateError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Execute(String),
    Prepare(String),
    Query { sql: String, params: Vec<Option<String>> },
    Batch(usize),
    Begin,
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub conn: usize,
    pub role: ConnectionRole,
    pub event: Event,
}

type RowPredicate = Arc<dyn Fn(&[Row]) -> bool + Send + Sync>;

/// Knobs for making individual operations fail.
#[derive(Clone, Default)]
pub struct Failures {
    pub open: Option<ConnectionRole>,
    /// Fail any `execute` whose SQL contains this text.
    pub execute_containing: Option<String>,
    /// Fail any `prepare` whose SQL contains this text.
    pub prepare_containing: Option<String>,
    /// Fail the nth `execute_batch` call (1-based) on each sink connection.
    pub batch_number: Option<usize>,
    /// Fail commit when the predicate matches the uncommitted rows.
    pub commit_if: Option<RowPredicate>,
    /// Source cursors stop producing rows and hang after this many rows.
    pub stall_after: Option<usize>,
    /// Partition indexes that stall; empty means every partition.
    pub stalled_partitions: Vec<u64>,
    /// Source cursors yield an error after this many rows.
    pub fetch_error_after: Option<usize>,
}

#[derive(Default)]
struct MockState {
    source_rows: Vec<Row>,
    committed: Vec<Row>,
    events: Vec<Recorded>,
    next_conn: usize,
    open_connections: usize,
    failures: Failures,
}

/// Shared in-memory database acting as both source and sink.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl MockDatabase {
    /// Source table with `count` rows of `(id, name)`, ids `0..count`.
    pub fn with_rows(count: usize) -> Self {
        let rows = (0..count)
            .map(|i| Row::new(vec![Some(i.to_string()), Some(format!("row-{}", i))]))
            .collect();
        Self::with_source(rows)
    }

    pub fn with_source(rows: Vec<Row>) -> Self {
        let db = Self::default();
        db.lock().source_rows = rows;
        db
    }

    pub fn set_failures(&self, failures: Failures) {
        self.lock().failures = failures;
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.lock().events.clone()
    }

    /// Events of one connection, in order.
    pub fn events_for(&self, conn: usize) -> Vec<Event> {
        self.lock()
            .events
            .iter()
            .filter(|r| r.conn == conn)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Ids of every connection opened for a role, in open order.
    pub fn connections(&self, role: ConnectionRole) -> Vec<usize> {
        self.lock()
            .events
            .iter()
            .filter(|r| r.role == role && r.event == Event::Open)
            .map(|r| r.conn)
            .collect()
    }

    pub fn committed(&self) -> Vec<Row> {
        self.lock().committed.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, conn: usize, role: ConnectionRole, event: Event) {
        self.lock().events.push(Recorded { conn, role, event });
    }
}

#[async_trait]
impl ConnectionFactory for MockDatabase {
    async fn open(&self, role: ConnectionRole) -> Result<Box<dyn Connection>> {
        let id = {
            let mut state = self.lock();
            if state.failures.open == Some(role) {
                return Err(ReplicateError::connection(role, "connection refused"));
            }
            state.next_conn += 1;
            state.open_connections += 1;
            state.next_conn
        };
        self.record(id, role, Event::Open);
        Ok(Box::new(MockConnection {
            id,
            role,
            db: self.clone(),
            pending: Vec::new(),
            batches: 0,
        }))
    }
}

pub struct MockConnection {
    id: usize,
    role: ConnectionRole,
    db: MockDatabase,
    pending: Vec<Row>,
    batches: usize,
}

impl MockConnection {
    fn record(&self, event: Event) {
        self.db.record(self.id, self.role, event);
    }

    fn failures(&self) -> Failures {
        self.db.lock().failures.clone()
    }
}

/// Highest `$n` placeholder in the SQL.
fn placeholder_count(sql: &str) -> usize {
    sql.split('$')
        .skip(1)
        .filter_map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<usize>().ok()
        })
        .max()
        .unwrap_or(0)
}

/// Partition count embedded in `mod(abs(hashtext(..)::bigint), N)`.
fn partition_count(sql: &str) -> Option<u64> {
    let rest = sql.split("::bigint), ").nth(1)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[async_trait]
impl Connection for MockConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.record(Event::Execute(sql.to_string()));
        match self.failures().execute_containing {
            Some(needle) if sql.contains(&needle) => {
                Err(ReplicateError::execution(format!("rejected: {}", sql)))
            }
            _ => Ok(()),
        }
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.record(Event::Prepare(sql.to_string()));
        match self.failures().prepare_containing {
            Some(needle) if sql.contains(&needle) => {
                Err(ReplicateError::preparation(format!("syntax error: {}", sql)))
            }
            _ => Ok(Statement::new(sql, placeholder_count(sql))),
        }
    }

    async fn query<'a>(&'a mut self, statement: &Statement) -> Result<RowCursor<'a>> {
        self.record(Event::Query {
            sql: statement.sql().to_string(),
            params: statement.params().to_vec(),
        });

        let total = partition_count(statement.sql()).unwrap_or(1);
        let index: u64 = statement
            .params()
            .first()
            .cloned()
            .flatten()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        let failures = self.failures();
        let mut rows: Vec<Result<Row>> = self
            .db
            .lock()
            .source_rows
            .iter()
            .filter(|row| {
                let id: u64 = row.get(0).and_then(|v| v.parse().ok()).unwrap_or(0);
                id % total == index
            })
            .cloned()
            .map(Ok)
            .collect();

        if let Some(n) = failures.fetch_error_after {
            rows.truncate(n);
            rows.push(Err(ReplicateError::execution("connection reset during fetch")));
        }
        let stalls = failures.stalled_partitions.is_empty()
            || failures.stalled_partitions.contains(&index);
        if let (Some(n), true) = (failures.stall_after, stalls) {
            rows.truncate(n);
            return Ok(RowCursor::new(stream::iter(rows).chain(stream::pending())));
        }
        Ok(RowCursor::new(stream::iter(rows)))
    }

    async fn execute_batch(&mut self, _statement: &Statement, rows: &[Row]) -> Result<u64> {
        self.record(Event::Batch(rows.len()));
        self.batches += 1;
        if self.failures().batch_number == Some(self.batches) {
            return Err(ReplicateError::execution("duplicate key value"));
        }
        self.pending.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn begin(&mut self) -> Result<()> {
        self.record(Event::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record(Event::Commit);
        if let Some(predicate) = self.failures().commit_if {
            if (predicate.as_ref())(&self.pending) {
                return Err(ReplicateError::commit("could not serialize access"));
            }
        }
        let pending = std::mem::take(&mut self.pending);
        self.db.lock().committed.extend(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record(Event::Rollback);
        self.pending.clear();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.record(Event::Close);
        self.db.lock().open_connections -= 1;
        Ok(())
    }
}
