//! # partition-replicate
//!
//! Hash-partitioned parallel table replication between relational databases.
//!
//! A source table (or query) is split into N disjoint partitions by hashing
//! a stable row identifier modulo N. Each partition is read over its own
//! source connection and written over its own sink connection in
//! fixed-size batches inside a single transaction, so partitions commit
//! independently and never coordinate.
//!
//! - **PostgreSQL** and **SQL Server** on either side
//! - **Bounded memory**: at most one batch buffered per partition
//! - **Cancellation** observed between fetches and before every flush
//!
//! ## Example
//!
//! ```rust,no_run
//! use partition_replicate::{Config, Replicator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> partition_replicate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let replicator = Replicator::new(config)?;
//!     let report = replicator.run(CancellationToken::new()).await?;
//!     println!("Replicated {} rows", report.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod pipeline;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, ConfigOverrides, ReplicationConfig, SinkConfig, SourceConfig};
pub use crate::core::{ColumnSelection, ConnectionRole, PartitionSpec, Row, TableDescriptor};
pub use drivers::{DialectImpl, DriverFactory};
pub use error::{ErrorKind, ReplicateError, Result};
pub use orchestrator::{
    HealthCheckResult, PartitionReport, PartitionStatus, ReplicationPlan, ReplicationReport,
    Replicator, RunStatus,
};
pub use pipeline::{BatchWriter, PartitionWorker, PartitionedReader};
