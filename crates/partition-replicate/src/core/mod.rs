//! Core abstractions for database-agnostic replication.
//!
//! - [`value`]: Text row representation shared by readers and writers
//! - [`partition`]: Partition identity and connection roles
//! - [`table`]: Source and sink table descriptors
//! - [`traits`]: Connectivity and dialect seams implemented by drivers
//!
//! Driver modules (`drivers/postgres`, `drivers/mssql`) implement these
//! traits; the pipeline only ever talks to them through `dyn Connection`
//! and `&dyn Dialect`.

pub mod partition;
pub mod table;
pub mod traits;
pub mod value;

pub use partition::{ConnectionRole, PartitionSpec};
pub use table::{ColumnSelection, TableDescriptor};
pub use traits::{
    Connection, ConnectionFactory, Dialect, HashTarget, RowCursor, SessionStep, Statement,
};
pub use value::Row;
