//! Configuration validation.

use super::{Config, ConnectionConfig};
use crate::drivers::DialectImpl;
use crate::error::{ReplicateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source.connection)?;
    validate_connection("sink", &config.sink.connection)?;

    if is_blank(&config.source.table) && is_blank(&config.source.query) {
        return Err(ReplicateError::Config(
            "source.table or source.query is required".into(),
        ));
    }
    if is_blank(&config.sink.table) {
        return Err(ReplicateError::Config("sink.table is required".into()));
    }

    // Cannot replicate a table onto itself
    let (src, dst) = (&config.source.connection, &config.sink.connection);
    if src.host == dst.host
        && src.effective_port() == dst.effective_port()
        && src.database == dst.database
        && is_blank(&config.source.query)
        && config.source.table == config.sink.table
    {
        return Err(ReplicateError::Config(
            "source and sink cannot be the same table".into(),
        ));
    }

    if config.replication.jobs == 0 {
        return Err(ReplicateError::Config(
            "replication.jobs must be at least 1".into(),
        ));
    }
    if config.replication.batch_size == 0 {
        return Err(ReplicateError::Config(
            "replication.batch_size must be at least 1".into(),
        ));
    }

    Ok(())
}

fn validate_connection(section: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(ReplicateError::Config(format!("{}.host is required", section)));
    }
    if conn.database.is_empty() {
        return Err(ReplicateError::Config(format!(
            "{}.database is required",
            section
        )));
    }
    if conn.user.is_empty() {
        return Err(ReplicateError::Config(format!("{}.user is required", section)));
    }
    DialectImpl::from_db_type(&conn.r#type).map_err(|_| {
        ReplicateError::Config(format!(
            "{}.type must be 'postgres' or 'mssql', got '{}'",
            section, conn.r#type
        ))
    })?;
    Ok(())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplicationConfig, SinkConfig, SourceConfig};

    fn connection(r#type: &str, host: &str) -> ConnectionConfig {
        ConnectionConfig {
            r#type: r#type.to_string(),
            host: host.to_string(),
            port: None,
            database: "app".to_string(),
            user: "replicator".to_string(),
            password: "password".to_string(),
            ssl_mode: "disable".to_string(),
            encrypt: "false".to_string(),
            trust_server_cert: true,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                connection: connection("postgres", "src"),
                table: Some("orders".to_string()),
                columns: None,
                query: None,
                filter: None,
            },
            sink: SinkConfig {
                connection: connection("mssql", "dst"),
                table: Some("orders".to_string()),
                columns: None,
            },
            replication: ReplicationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unsupported_type() {
        let mut config = valid_config();
        config.sink.connection.r#type = "oracle".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("sink.type"));
    }

    #[test]
    fn test_source_needs_table_or_query() {
        let mut config = valid_config();
        config.source.table = Some("  ".to_string());
        assert!(validate(&config).is_err());

        config.source.query = Some("SELECT * FROM orders".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_sink_needs_table() {
        let mut config = valid_config();
        config.sink.table = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_table_rejected() {
        let mut config = valid_config();
        config.sink.connection = config.source.connection.clone();
        assert!(validate(&config).is_err());

        config.sink.table = Some("orders_copy".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_jobs_and_batch_size() {
        let mut config = valid_config();
        config.replication.jobs = 0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.replication.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = valid_config();
        config.source.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
