//! PostgreSQL connection backed by `tokio-postgres`.
//!
//! Result values are decoded by PostgreSQL type and rendered as text;
//! queries returning types without a native decoder are re-prepared with
//! those columns cast to `text` by the server.
//! Parameters go over the wire in text format with any declared type, so
//! the server applies its own input conversion to each value.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::future::try_join_all;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use super::PostgresDialect;
use crate::config::ConnectionConfig;
use crate::core::traits::{Connection, Dialect, RowCursor, Statement};
use crate::core::{ConnectionRole, Row};
use crate::drivers::common::TlsBuilder;
use crate::error::{ReplicateError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// A single PostgreSQL connection serving one role.
pub struct PostgresConnection {
    role: ConnectionRole,
    client: Client,
    dialect: PostgresDialect,
    /// Server-side prepared statements keyed by SQL text.
    statements: HashMap<String, tokio_postgres::Statement>,
    driver: JoinHandle<()>,
}

impl PostgresConnection {
    /// Connect using the endpoint settings for `role`.
    pub async fn connect(config: &ConnectionConfig, role: ConnectionRole) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config
            .host(&config.host)
            .port(config.effective_port())
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .application_name("partition-replicate");

        let tls = TlsBuilder::parse(&config.ssl_mode)?;
        let (client, driver) = match tls.connector()? {
            Some(connector) => {
                let (client, connection) = pg_config
                    .connect(connector)
                    .await
                    .map_err(|e| ReplicateError::connection(role, pg_error(&e)))?;
                (client, spawn_driver(connection, role))
            }
            None => {
                warn!(
                    "PostgreSQL {} TLS is disabled. Credentials will be transmitted in plaintext.",
                    role
                );
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| ReplicateError::connection(role, pg_error(&e)))?;
                (client, spawn_driver(connection, role))
            }
        };

        info!(
            "Connected to PostgreSQL {}: {}:{}/{}",
            role,
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            role,
            client,
            dialect: PostgresDialect::new(),
            statements: HashMap::new(),
            driver,
        })
    }

    fn native(&self, statement: &Statement) -> Result<tokio_postgres::Statement> {
        self.statements.get(statement.sql()).cloned().ok_or_else(|| {
            ReplicateError::preparation(format!(
                "statement was not prepared on this connection: {}",
                statement.sql()
            ))
        })
    }

    async fn simple(&self, sql: &str) -> std::result::Result<(), tokio_postgres::Error> {
        self.client.batch_execute(sql).await
    }
}

/// Drive the connection state machine until the client is dropped.
fn spawn_driver<F>(connection: F, role: ConnectionRole) -> JoinHandle<()>
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL {} connection terminated: {}", role, pg_error(&e));
        }
    })
}

#[async_trait]
impl Connection for PostgresConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}: {}", self.role, sql);
        self.simple(sql)
            .await
            .map_err(|e| ReplicateError::execution(pg_error(&e)))
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        let native = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| ReplicateError::preparation(pg_error(&e)))?;
        let column_types: Vec<Type> = native
            .columns()
            .iter()
            .map(|c| c.type_().clone())
            .collect();
        let native = match text_projection(sql, &column_types) {
            Some(projected) => {
                debug!("{}: reading non-decodable columns as text", self.role);
                self.client
                    .prepare(&projected)
                    .await
                    .map_err(|e| ReplicateError::preparation(pg_error(&e)))?
            }
            None => native,
        };
        let param_count = native.params().len();
        self.statements.insert(sql.to_string(), native);
        Ok(Statement::new(sql, param_count))
    }

    async fn query<'a>(&'a mut self, statement: &Statement) -> Result<RowCursor<'a>> {
        let native = self.native(statement)?;
        let params: Vec<TextParam<'_>> = statement
            .params()
            .iter()
            .map(|p| TextParam(p.as_deref()))
            .collect();

        let rows = self
            .client
            .query_raw(&native, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await
            .map_err(|e| ReplicateError::execution(pg_error(&e)))?;

        Ok(RowCursor::new(rows.map(|row| {
            row.map_err(|e| ReplicateError::execution(pg_error(&e)))
                .and_then(|row| decode_row(&row))
        })))
    }

    async fn execute_batch(&mut self, statement: &Statement, rows: &[Row]) -> Result<u64> {
        let native = self.native(statement)?;
        let expected = native.params().len();
        if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
            return Err(ReplicateError::execution(format!(
                "row has {} values but the statement expects {}",
                bad.len(),
                expected
            )));
        }

        // Issued concurrently so tokio-postgres pipelines them on one connection
        let client = &self.client;
        let native = &native;
        let inserts = rows.iter().map(|row| async move {
            let params: Vec<TextParam<'_>> =
                row.values().iter().map(|v| TextParam(v.as_deref())).collect();
            client
                .execute_raw(native, params.iter().map(|p| p as &(dyn ToSql + Sync)))
                .await
        });

        let counts = try_join_all(inserts)
            .await
            .map_err(|e| ReplicateError::execution(pg_error(&e)))?;
        Ok(counts.into_iter().sum())
    }

    async fn begin(&mut self) -> Result<()> {
        self.simple(self.dialect.begin_transaction_sql())
            .await
            .map_err(|e| ReplicateError::execution(pg_error(&e)))
    }

    async fn commit(&mut self) -> Result<()> {
        self.simple(self.dialect.commit_sql())
            .await
            .map_err(|e| ReplicateError::commit(pg_error(&e)))
    }

    async fn rollback(&mut self) -> Result<()> {
        self.simple(self.dialect.rollback_sql())
            .await
            .map_err(|e| ReplicateError::execution(pg_error(&e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self {
            role,
            client,
            statements,
            driver,
            ..
        } = *self;
        drop(statements);
        drop(client);
        if let Err(e) = driver.await {
            warn!("PostgreSQL {} connection task failed: {}", role, e);
        }
        debug!("Closed PostgreSQL {} connection", role);
        Ok(())
    }
}

/// Text-format parameter accepted for any column type.
#[derive(Debug)]
struct TextParam<'a>(Option<&'a str>);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self.0 {
            Some(value) => {
                out.extend_from_slice(value.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.len())
        .map(|idx| decode_value(row, idx))
        .collect::<Result<Vec<_>>>()
        .map(Row::new)
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        ReplicateError::execution(format!(
            "decoding column '{}': {}",
            row.columns()[idx].name(),
            e
        ))
    })
}

/// Whether [`decode_value`] reads the type directly off the wire.
fn decodes_natively(ty: &Type) -> bool {
    matches!(
        ty.name(),
        "bool"
            | "int2"
            | "int4"
            | "int8"
            | "oid"
            | "float4"
            | "float8"
            | "numeric"
            | "uuid"
            | "date"
            | "time"
            | "timestamp"
            | "timestamptz"
            | "bytea"
            | "json"
            | "jsonb"
    ) || <String as FromSql<'_>>::accepts(ty)
}

/// Re-project a query so every column the decoder cannot read comes back
/// as `text`. `None` when all columns already decode.
fn text_projection(sql: &str, column_types: &[Type]) -> Option<String> {
    if column_types.iter().all(decodes_natively) {
        return None;
    }

    let aliases: Vec<String> = (1..=column_types.len()).map(|i| format!("_c{}", i)).collect();
    let projection: Vec<String> = column_types
        .iter()
        .zip(&aliases)
        .map(|(ty, alias)| {
            if decodes_natively(ty) {
                alias.clone()
            } else {
                format!("{}::text", alias)
            }
        })
        .collect();

    Some(format!(
        "SELECT {} FROM ({}) AS src_text({})",
        projection.join(", "),
        sql,
        aliases.join(", ")
    ))
}

/// Render one column of a PostgreSQL row as text.
fn decode_value(row: &tokio_postgres::Row, idx: usize) -> Result<Option<String>> {
    let type_name = row.columns()[idx].type_().name().to_string();

    let value = match type_name.as_str() {
        "bool" => get::<bool>(row, idx)?.map(|v| v.to_string()),
        "int2" => get::<i16>(row, idx)?.map(|v| v.to_string()),
        "int4" => get::<i32>(row, idx)?.map(|v| v.to_string()),
        "int8" => get::<i64>(row, idx)?.map(|v| v.to_string()),
        "oid" => get::<u32>(row, idx)?.map(|v| v.to_string()),
        "float4" => get::<f32>(row, idx)?.map(|v| v.to_string()),
        "float8" => get::<f64>(row, idx)?.map(|v| v.to_string()),
        "numeric" => get::<rust_decimal::Decimal>(row, idx)?.map(|v| v.to_string()),
        "uuid" => get::<uuid::Uuid>(row, idx)?.map(|v| v.to_string()),
        "date" => get::<chrono::NaiveDate>(row, idx)?.map(|v| v.format(DATE_FORMAT).to_string()),
        "time" => get::<chrono::NaiveTime>(row, idx)?.map(|v| v.format(TIME_FORMAT).to_string()),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|v| v.format(TIMESTAMP_FORMAT).to_string()),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map(|v| v.format(TIMESTAMPTZ_FORMAT).to_string()),
        "bytea" => get::<Vec<u8>>(row, idx)?.map(|v| format!("\\x{}", hex::encode(v))),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx)?.map(|v| v.to_string()),
        _ => get::<String>(row, idx)?,
    };

    Ok(value)
}

/// Prefer the server's message over the driver's terse summary.
fn pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::types::Kind;

    #[test]
    fn test_text_param_encodes_raw_text() {
        let mut buf = BytesMut::new();
        let param = TextParam(Some("2024-01-31"));
        let is_null = param.to_sql(&Type::DATE, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(&buf[..], b"2024-01-31");
        assert!(matches!(param.encode_format(&Type::DATE), Format::Text));
    }

    #[test]
    fn test_text_param_null() {
        let mut buf = BytesMut::new();
        let is_null = TextParam(None).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decodes_natively() {
        for ty in [
            Type::INT8,
            Type::NUMERIC,
            Type::TIMESTAMPTZ,
            Type::JSONB,
            Type::VARCHAR,
            Type::BPCHAR,
            Type::NAME,
        ] {
            assert!(decodes_natively(&ty), "{}", ty);
        }
        for ty in [
            Type::INTERVAL,
            Type::INET,
            Type::MONEY,
            Type::TIMETZ,
            Type::BIT,
            Type::INT4_ARRAY,
            Type::TEXT_ARRAY,
        ] {
            assert!(!decodes_natively(&ty), "{}", ty);
        }
    }

    #[test]
    fn test_enum_columns_read_as_text() {
        let mood = Type::new(
            "mood".to_string(),
            90_001,
            Kind::Enum(vec!["happy".to_string(), "sad".to_string()]),
            "public".to_string(),
        );
        assert!(!decodes_natively(&mood));
        assert_eq!(
            text_projection("SELECT id, feeling FROM people", &[Type::INT4, mood]).unwrap(),
            "SELECT _c1, _c2::text FROM (SELECT id, feeling FROM people) AS src_text(_c1, _c2)"
        );
    }

    #[test]
    fn test_text_projection() {
        let sql = "SELECT * FROM events WHERE mod(abs(hashtext(ctid::text)::bigint), 4) = $1";
        assert_eq!(text_projection(sql, &[Type::INT8, Type::TEXT, Type::TIMESTAMPTZ]), None);
        assert_eq!(
            text_projection(sql, &[Type::INT8, Type::INTERVAL, Type::INET, Type::INT4_ARRAY])
                .unwrap(),
            format!(
                "SELECT _c1, _c2::text, _c3::text, _c4::text FROM ({}) AS src_text(_c1, _c2, _c3, _c4)",
                sql
            )
        );
    }

    #[test]
    fn test_text_param_accepts_any_type() {
        assert!(<TextParam<'_> as ToSql>::accepts(&Type::NUMERIC));
        assert!(<TextParam<'_> as ToSql>::accepts(&Type::BYTEA));
    }
}
