//! Batched, single-transaction sink writer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::traits::{Connection, ConnectionFactory, Dialect, RowCursor, Statement};
use crate::core::{ConnectionRole, PartitionSpec, Row, TableDescriptor};
use crate::error::{ReplicateError, Result};

use super::session::SessionConfigurer;
use super::statement::StatementBuilder;

/// Default rows per INSERT batch.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Progress of one writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchState {
    pub batch_size: usize,
    pub rows_buffered: usize,
    pub rows_written: u64,
    pub batches_executed: u64,
}

impl BatchState {
    fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            rows_buffered: 0,
            rows_written: 0,
            batches_executed: 0,
        }
    }
}

/// Drains a cursor into the sink in fixed-size batches inside one
/// transaction, committing once at the end.
pub struct BatchWriter {
    connection: Box<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    state: BatchState,
    cancel: CancellationToken,
    partition: Option<PartitionSpec>,
}

impl BatchWriter {
    /// Open a sink connection.
    pub async fn connect(
        factory: &dyn ConnectionFactory,
        dialect: Arc<dyn Dialect>,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(ReplicateError::Config(
                "batch size must be at least 1".into(),
            ));
        }
        let connection = factory.open(ConnectionRole::Sink).await?;
        Ok(Self {
            connection,
            dialect,
            state: BatchState::new(batch_size),
            cancel,
            partition: None,
        })
    }

    /// Tag log lines with the partition being written.
    pub fn with_partition(mut self, partition: PartitionSpec) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Write every row the cursor produces and commit.
    ///
    /// The connection is released on every path. On failure or
    /// cancellation the transaction is rolled back before the error is
    /// returned.
    pub async fn write_all(
        mut self,
        cursor: &mut RowCursor<'_>,
        table: &TableDescriptor,
    ) -> Result<u64> {
        let result = self.write_rows(cursor, table).await;

        if let Err(ref e) = result {
            debug!("{}: rolling back after {}", self.label(), e);
            if let Err(rollback_err) = self.connection.rollback().await {
                warn!("{}: rollback failed: {}", self.label(), rollback_err);
            }
        }

        self.close().await;
        result
    }

    /// Release the connection without writing.
    pub async fn close(self) {
        let label = self.label();
        if let Err(e) = self.connection.close().await {
            warn!("{}: error closing sink connection: {}", label, e);
        }
    }

    async fn write_rows(
        &mut self,
        cursor: &mut RowCursor<'_>,
        table: &TableDescriptor,
    ) -> Result<u64> {
        SessionConfigurer::new(self.dialect.as_ref())
            .configure(self.connection.as_mut(), true)
            .await?;
        self.connection.begin().await?;

        let Some(first) = next_row(&self.cancel, cursor).await? else {
            debug!("{}: source produced no rows", self.label());
            self.connection.commit().await?;
            return Ok(0);
        };

        let statement = self.prepare_insert(table, first.len()).await?;
        let mut pending: Vec<Row> = Vec::with_capacity(self.state.batch_size);
        let mut next = Some(first);

        while let Some(row) = next {
            pending.push(row);
            self.state.rows_buffered = pending.len();
            if pending.len() == self.state.batch_size {
                self.flush(&statement, &mut pending).await?;
            }
            next = next_row(&self.cancel, cursor).await?;
        }

        if !pending.is_empty() {
            self.flush(&statement, &mut pending).await?;
        }

        self.connection.commit().await?;
        debug!(
            "{}: committed {} rows in {} batches",
            self.label(),
            self.state.rows_written,
            self.state.batches_executed
        );
        Ok(self.state.rows_written)
    }

    async fn prepare_insert(&mut self, table: &TableDescriptor, width: usize) -> Result<Statement> {
        let insert = StatementBuilder::new(self.dialect.as_ref())
            .build_insert_statement(table, width)?;
        debug!("{}: {}", self.label(), insert.sql);
        self.connection.prepare(&insert.sql).await
    }

    async fn flush(&mut self, statement: &Statement, pending: &mut Vec<Row>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ReplicateError::Cancelled);
        }

        let rows = pending.len();
        self.connection.execute_batch(statement, pending).await?;
        pending.clear();

        self.state.rows_buffered = 0;
        self.state.rows_written += rows as u64;
        self.state.batches_executed += 1;
        debug!(
            "{}: batch {} ({} rows, {} total)",
            self.label(),
            self.state.batches_executed,
            rows,
            self.state.rows_written
        );
        Ok(())
    }

    fn label(&self) -> String {
        match self.partition {
            Some(p) => format!("partition {}", p),
            None => "writer".to_string(),
        }
    }
}

/// Next row from the cursor, or `Cancelled` if the run is cancelled first
/// (including while the fetch is pending).
async fn next_row(cancel: &CancellationToken, cursor: &mut RowCursor<'_>) -> Result<Option<Row>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReplicateError::Cancelled),
        row = cursor.next_row() => row,
    }
}
