//! Partitioned source reader.

use std::sync::Arc;

use tracing::debug;

use crate::core::traits::{Connection, ConnectionFactory, Dialect, RowCursor};
use crate::core::{ConnectionRole, PartitionSpec, TableDescriptor};
use crate::error::Result;

use super::session::SessionConfigurer;
use super::statement::StatementBuilder;

/// Reads one partition of the source over its own connection.
pub struct PartitionedReader {
    connection: Box<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    partition: PartitionSpec,
}

impl PartitionedReader {
    /// Open a source connection for `partition`.
    pub async fn connect(
        factory: &dyn ConnectionFactory,
        dialect: Arc<dyn Dialect>,
        partition: PartitionSpec,
    ) -> Result<Self> {
        let connection = factory.open(ConnectionRole::Source).await?;
        Ok(Self {
            connection,
            dialect,
            partition,
        })
    }

    pub fn partition(&self) -> PartitionSpec {
        self.partition
    }

    /// Configure the session, then run the partition's read statement.
    ///
    /// The returned cursor borrows this reader; it must be dropped before
    /// the reader is closed.
    pub async fn open(&mut self, table: &TableDescriptor) -> Result<RowCursor<'_>> {
        let read = StatementBuilder::new(self.dialect.as_ref())
            .build_read_statement(table, self.partition.total_partitions())?;

        SessionConfigurer::new(self.dialect.as_ref())
            .configure(self.connection.as_mut(), read.for_full_scan)
            .await?;

        debug!("Partition {} read ({:?}): {}", self.partition, read.shape, read.sql);
        let mut statement = self.connection.prepare(&read.sql).await?;
        statement.bind(read.bind_slot, Some(self.partition.index().to_string()))?;

        self.connection.query(&statement).await
    }

    /// Release the source connection.
    pub async fn close(self) -> Result<()> {
        self.connection.close().await
    }
}
