//! The partitioned extract-and-load pipeline.
//!
//! - [`SessionConfigurer`]: connection-scoped settings applied before any statement
//! - [`PartitionPredicateBuilder`]: the hash-mod-N fragment restricting a scan
//! - [`StatementBuilder`]: read and INSERT statement composition
//! - [`PartitionedReader`]: source side of one partition
//! - [`BatchWriter`]: sink side, batched inside a single transaction
//! - [`PartitionWorker`]: pairs a reader and a writer for one partition

mod predicate;
mod reader;
mod session;
mod statement;
mod worker;
mod writer;

pub use predicate::{PartitionPredicate, PartitionPredicateBuilder};
pub use reader::PartitionedReader;
pub use session::SessionConfigurer;
pub use statement::{InsertStatement, ReadShape, ReadStatement, StatementBuilder};
pub use worker::{PartitionOutcome, PartitionWorker};
pub use writer::{BatchState, BatchWriter, DEFAULT_BATCH_SIZE};
