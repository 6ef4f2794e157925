//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{ColumnSelection, TableDescriptor};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Read side.
    pub source: SourceConfig,

    /// Write side.
    pub sink: SinkConfig,

    /// Parallelism and batching.
    #[serde(default)]
    pub replication: ReplicationConfig,
}

/// Connection settings shared by both endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type: "postgres" or "mssql".
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432 for postgres, 1433 for mssql).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// PostgreSQL SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// SQL Server encryption (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust the server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl ConnectionConfig {
    /// Configured port, or the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => 1433,
            _ => 5432,
        })
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.effective_port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Source endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Table to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Comma-separated column list (default: all columns).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,

    /// Free-form query read instead of the table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Extra condition ANDed into the table scan.
    #[serde(
        rename = "where",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub filter: Option<String>,
}

impl SourceConfig {
    pub fn table_descriptor(&self) -> TableDescriptor {
        TableDescriptor {
            name: self.table.clone().unwrap_or_default(),
            columns: ColumnSelection::parse(self.columns.as_deref()),
            query: self.query.clone(),
            filter: self.filter.clone(),
        }
    }
}

/// Sink endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Table to insert into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Comma-separated column list (default: positional insert).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<String>,
}

impl SinkConfig {
    pub fn table_descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(self.table.clone().unwrap_or_default())
            .with_columns(ColumnSelection::parse(self.columns.as_deref()))
    }
}

/// Replication behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Number of partitions, each with its own worker (default: 4).
    #[serde(default = "default_jobs")]
    pub jobs: u32,

    /// Rows per INSERT batch (default: 5000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Cancel sibling partitions as soon as one fails (default: false).
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            batch_size: default_batch_size(),
            fail_fast: false,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_table: Option<String>,
    pub source_columns: Option<String>,
    pub source_query: Option<String>,
    pub source_where: Option<String>,
    pub sink_table: Option<String>,
    pub sink_columns: Option<String>,
    pub jobs: Option<u32>,
    pub batch_size: Option<usize>,
}

// Default value functions for serde
fn default_jobs() -> u32 {
    4
}

fn default_batch_size() -> usize {
    5000
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_require() -> String {
    "require".to_string()
}
