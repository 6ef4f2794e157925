//! One partition's extract-and-load unit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::traits::{ConnectionFactory, Dialect};
use crate::core::{PartitionSpec, TableDescriptor};
use crate::error::{ReplicateError, Result};

use super::reader::PartitionedReader;
use super::writer::BatchWriter;

/// Result of running one partition.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: PartitionSpec,
    pub result: Result<u64>,
    pub duration: Duration,
}

impl PartitionOutcome {
    pub fn rows_written(&self) -> u64 {
        self.result.as_ref().copied().unwrap_or(0)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Pairs a reader and a writer for a single partition.
///
/// Each run opens its own source and sink connections and releases both
/// before returning, whatever the outcome.
#[derive(Clone)]
pub struct PartitionWorker {
    factory: Arc<dyn ConnectionFactory>,
    source_dialect: Arc<dyn Dialect>,
    sink_dialect: Arc<dyn Dialect>,
    partition: PartitionSpec,
    batch_size: usize,
    cancel: CancellationToken,
}

impl PartitionWorker {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        source_dialect: Arc<dyn Dialect>,
        sink_dialect: Arc<dyn Dialect>,
        partition: PartitionSpec,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            factory,
            source_dialect,
            sink_dialect,
            partition,
            batch_size,
            cancel,
        }
    }

    pub fn partition(&self) -> PartitionSpec {
        self.partition
    }

    /// Copy this partition of `source` into `sink`.
    pub async fn run(&self, source: &TableDescriptor, sink: &TableDescriptor) -> PartitionOutcome {
        let start = Instant::now();
        let result = self.transfer(source, sink).await;
        let duration = start.elapsed();

        match &result {
            Ok(rows) => debug!(
                "Partition {}: {} rows in {:.2}s",
                self.partition,
                rows,
                duration.as_secs_f64()
            ),
            Err(e) => debug!("Partition {}: {}", self.partition, e),
        }

        PartitionOutcome {
            partition: self.partition,
            result,
            duration,
        }
    }

    async fn transfer(&self, source: &TableDescriptor, sink: &TableDescriptor) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(ReplicateError::Cancelled);
        }

        let mut reader = PartitionedReader::connect(
            self.factory.as_ref(),
            self.source_dialect.clone(),
            self.partition,
        )
        .await?;

        let writer = match BatchWriter::connect(
            self.factory.as_ref(),
            self.sink_dialect.clone(),
            self.batch_size,
            self.cancel.clone(),
        )
        .await
        {
            Ok(writer) => writer.with_partition(self.partition),
            Err(e) => {
                self.close_reader(reader).await;
                return Err(e);
            }
        };

        let result = match reader.open(source).await {
            Ok(mut cursor) => writer.write_all(&mut cursor, sink).await,
            Err(e) => {
                writer.close().await;
                Err(e)
            }
        };

        self.close_reader(reader).await;
        result
    }

    async fn close_reader(&self, reader: PartitionedReader) {
        if let Err(e) = reader.close().await {
            warn!(
                "Partition {}: error closing source connection: {}",
                self.partition, e
            );
        }
    }
}
