//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`postgres`]: PostgreSQL driver
//! - [`common`]: Shared utilities (TLS)
//!
//! Each driver provides a `Dialect` and a `Connection`. [`DialectImpl`]
//! selects the dialect for a configured database type and [`DriverFactory`]
//! opens connections for either endpoint.

pub mod common;
pub mod mssql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mssql::{MssqlConnection, MssqlDialect};
pub use postgres::{PostgresConnection, PostgresDialect};

use async_trait::async_trait;

use crate::config::{Config, ConnectionConfig};
use crate::core::traits::{Connection, ConnectionFactory, Dialect, HashTarget, SessionStep};
use crate::core::ConnectionRole;
use crate::error::{ReplicateError, Result};

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match statement instead of using vtable dispatch.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Mssql(d) => d.param_placeholder(index),
            DialectImpl::Postgres(d) => d.param_placeholder(index),
        }
    }

    fn session_statement(&self, step: SessionStep) -> Option<String> {
        match self {
            DialectImpl::Mssql(d) => d.session_statement(step),
            DialectImpl::Postgres(d) => d.session_statement(step),
        }
    }

    fn partition_hash(&self, target: HashTarget<'_>, total_partitions: u32) -> String {
        match self {
            DialectImpl::Mssql(d) => d.partition_hash(target, total_partitions),
            DialectImpl::Postgres(d) => d.partition_hash(target, total_partitions),
        }
    }

    fn derived_table_alias(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.derived_table_alias(),
            DialectImpl::Postgres(d) => d.derived_table_alias(),
        }
    }

    fn full_scan_select_hint(&self, table: &str) -> Option<String> {
        match self {
            DialectImpl::Mssql(d) => d.full_scan_select_hint(table),
            DialectImpl::Postgres(d) => d.full_scan_select_hint(table),
        }
    }

    fn full_scan_table_hint(&self) -> Option<String> {
        match self {
            DialectImpl::Mssql(d) => d.full_scan_table_hint(),
            DialectImpl::Postgres(d) => d.full_scan_table_hint(),
        }
    }

    fn bulk_insert_hint(&self) -> Option<String> {
        match self {
            DialectImpl::Mssql(d) => d.bulk_insert_hint(),
            DialectImpl::Postgres(d) => d.bulk_insert_hint(),
        }
    }

    fn begin_transaction_sql(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.begin_transaction_sql(),
            DialectImpl::Postgres(d) => d.begin_transaction_sql(),
        }
    }

    fn commit_sql(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.commit_sql(),
            DialectImpl::Postgres(d) => d.commit_sql(),
        }
    }

    fn rollback_sql(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.rollback_sql(),
            DialectImpl::Postgres(d) => d.rollback_sql(),
        }
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            other => Err(ReplicateError::Config(format!(
                "Unknown database type: '{}'. Supported types: mssql, postgres",
                other
            ))),
        }
    }
}

/// Opens driver connections for the configured source and sink endpoints.
#[derive(Debug, Clone)]
pub struct DriverFactory {
    source: ConnectionConfig,
    sink: ConnectionConfig,
}

impl DriverFactory {
    pub fn new(source: ConnectionConfig, sink: ConnectionConfig) -> Self {
        Self { source, sink }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.source.connection.clone(),
            config.sink.connection.clone(),
        )
    }

    /// Endpoint settings for a role.
    pub fn endpoint(&self, role: ConnectionRole) -> &ConnectionConfig {
        match role {
            ConnectionRole::Source => &self.source,
            ConnectionRole::Sink => &self.sink,
        }
    }

    /// Dialect spoken by the endpoint for a role.
    pub fn dialect(&self, role: ConnectionRole) -> Result<DialectImpl> {
        DialectImpl::from_db_type(&self.endpoint(role).r#type)
    }
}

#[async_trait]
impl ConnectionFactory for DriverFactory {
    async fn open(&self, role: ConnectionRole) -> Result<Box<dyn Connection>> {
        let endpoint = self.endpoint(role);
        match self.dialect(role)? {
            DialectImpl::Postgres(_) => {
                Ok(Box::new(PostgresConnection::connect(endpoint, role).await?))
            }
            DialectImpl::Mssql(_) => Ok(Box::new(MssqlConnection::connect(endpoint, role).await?)),
        }
    }
}
