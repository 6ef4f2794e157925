//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlConnection`]: `Connection` implementation over `tiberius`

mod connection;
mod dialect;

pub use connection::MssqlConnection;
pub use dialect::MssqlDialect;
