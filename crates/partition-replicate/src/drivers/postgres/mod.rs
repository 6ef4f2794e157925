//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresConnection`]: `Connection` implementation over `tokio-postgres`

mod connection;
mod dialect;

pub use connection::PostgresConnection;
pub use dialect::PostgresDialect;
