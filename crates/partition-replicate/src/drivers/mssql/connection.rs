//! SQL Server connection backed by `tiberius` over tokio TCP.
//!
//! Session and transaction statements run as plain SQL batches so their
//! effects outlive the call; parameterized statements go through
//! `sp_executesql` with every value bound as `nvarchar`. Batches are sent
//! as multi-row `INSERT ... VALUES` requests within the parameter limit.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::StreamExt;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::MssqlDialect;
use crate::config::ConnectionConfig;
use crate::core::traits::{Connection, Dialect, RowCursor, Statement};
use crate::core::{ConnectionRole, Row};
use crate::error::{ReplicateError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIMEOFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %:z";

/// A single SQL Server connection serving one role.
pub struct MssqlConnection {
    role: ConnectionRole,
    client: Client<Compat<TcpStream>>,
    dialect: MssqlDialect,
}

impl MssqlConnection {
    /// Connect using the endpoint settings for `role`.
    pub async fn connect(config: &ConnectionConfig, role: ConnectionRole) -> Result<Self> {
        let tds_config = build_config(config);

        let tcp = TcpStream::connect(tds_config.get_addr())
            .await
            .map_err(|e| ReplicateError::connection(role, e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds_config, tcp.compat_write())
            .await
            .map_err(|e| ReplicateError::connection(role, e))?;

        info!(
            "Connected to MSSQL {}: {}:{}/{}",
            role,
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            role,
            client,
            dialect: MssqlDialect::new(),
        })
    }

    /// Run a plain SQL batch and drain its results.
    async fn batch(&mut self, sql: &str) -> std::result::Result<(), tiberius::error::Error> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

fn build_config(config: &ConnectionConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.effective_port());
    tds.database(&config.database);
    tds.application_name("partition-replicate");
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));

    if encryption_enabled(&config.encrypt) {
        if config.trust_server_cert {
            tds.trust_cert();
        }
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }
    tds
}

fn encryption_enabled(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "false" | "no" | "0" | "disable"
    )
}

/// Parameters a single request may carry.
const MAX_PARAMS: usize = 2100;

/// Upper bound on the row constructors of one INSERT ... VALUES.
const MAX_ROWS_PER_INSERT: usize = 1000;

/// Highest `@Pn` placeholder referenced by the statement, ignoring string
/// literals, quoted identifiers and comments.
fn count_placeholders(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_past(bytes, i + 1, &[bytes[i]]),
            b'[' => i = skip_past(bytes, i + 1, b"]"),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_past(bytes, i + 2, b"\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_past(bytes, i + 2, b"*/"),
            b'@' if bytes.get(i + 1) == Some(&b'P') => {
                let digits = bytes[i + 2..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit())
                    .count();
                if let Ok(n) = sql[i + 2..i + 2 + digits].parse::<usize>() {
                    max = max.max(n);
                }
                i += 2 + digits;
            }
            _ => i += 1,
        }
    }
    max
}

/// Index just past the next occurrence of `close` at or after `from`.
fn skip_past(bytes: &[u8], from: usize, close: &[u8]) -> usize {
    bytes
        .get(from..)
        .and_then(|rest| rest.windows(close.len()).position(|w| w == close))
        .map_or(bytes.len(), |p| from + p + close.len())
}

fn bind_all<'a>(sql: impl Into<String>, values: &[Option<String>]) -> Query<'a> {
    let mut query = Query::new(sql.into());
    for value in values {
        query.bind(value.clone());
    }
    query
}

/// Rows per multi-row INSERT for a statement `cols` values wide.
fn rows_per_insert(cols: usize) -> usize {
    (MAX_PARAMS / cols.max(1)).clamp(1, MAX_ROWS_PER_INSERT)
}

/// Widen a single-row `INSERT ... VALUES (@P1, ..)` to `rows` row
/// constructors, numbering parameters row by row.
fn multi_row_insert(sql: &str, cols: usize, rows: usize) -> Result<String> {
    let prefix = sql
        .rfind(" VALUES (")
        .map(|end| &sql[..end])
        .ok_or_else(|| {
            ReplicateError::preparation(format!("not a single-row INSERT ... VALUES: {}", sql))
        })?;

    let groups: Vec<String> = (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = (1..=cols)
                .map(|col| format!("@P{}", row * cols + col))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    Ok(format!("{} VALUES {}", prefix, groups.join(", ")))
}

/// Parameter values for a chunk, row-major to match [`multi_row_insert`].
fn chunk_params(rows: &[Row]) -> Vec<Option<String>> {
    rows.iter()
        .flat_map(|row| row.values().iter().cloned())
        .collect()
}

#[async_trait]
impl Connection for MssqlConnection {
    fn role(&self) -> ConnectionRole {
        self.role
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}: {}", self.role, sql);
        self.batch(sql).await.map_err(ReplicateError::execution)
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        // sp_executesql compiles on first execution; only the shape is checked here
        if sql.trim().is_empty() {
            return Err(ReplicateError::preparation("empty statement"));
        }
        Ok(Statement::new(sql, count_placeholders(sql)))
    }

    async fn query<'a>(&'a mut self, statement: &Statement) -> Result<RowCursor<'a>> {
        let query = bind_all(statement.sql(), statement.params());
        let stream = query
            .query(&mut self.client)
            .await
            .map_err(ReplicateError::execution)?;

        Ok(RowCursor::new(stream.into_row_stream().map(|row| {
            row.map_err(ReplicateError::execution).and_then(decode_row)
        })))
    }

    async fn execute_batch(&mut self, statement: &Statement, rows: &[Row]) -> Result<u64> {
        let cols = statement.param_count();
        if cols == 0 {
            return Err(ReplicateError::preparation(
                "INSERT statement has no parameters",
            ));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(ReplicateError::execution(format!(
                "row has {} values but the statement expects {}",
                bad.len(),
                cols
            )));
        }

        let mut affected = 0;
        for chunk in rows.chunks(rows_per_insert(cols)) {
            let sql = multi_row_insert(statement.sql(), cols, chunk.len())?;
            let result = bind_all(sql, &chunk_params(chunk))
                .execute(&mut self.client)
                .await
                .map_err(ReplicateError::execution)?;
            affected += result.total();
        }
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()> {
        let sql = self.dialect.begin_transaction_sql().to_string();
        self.batch(&sql).await.map_err(ReplicateError::execution)
    }

    async fn commit(&mut self) -> Result<()> {
        let sql = self.dialect.commit_sql().to_string();
        self.batch(&sql).await.map_err(ReplicateError::commit)
    }

    async fn rollback(&mut self) -> Result<()> {
        let sql = self.dialect.rollback_sql().to_string();
        self.batch(&sql).await.map_err(ReplicateError::execution)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let role = self.role;
        if let Err(e) = self.client.close().await {
            warn!("Error closing MSSQL {} connection: {}", role, e);
        }
        debug!("Closed MSSQL {} connection", role);
        Ok(())
    }
}

fn decode_row(row: tiberius::Row) -> Result<Row> {
    row.into_iter()
        .map(|data| decode_value(&data))
        .collect::<Result<Vec<_>>>()
        .map(Row::new)
}

fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Result<Option<T>> {
    T::from_sql(data).map_err(ReplicateError::execution)
}

/// Render one TDS column value as text.
fn decode_value(data: &ColumnData<'static>) -> Result<Option<String>> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|v| v.to_string()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::Binary(v) => v.as_ref().map(|b| format!("\\x{}", hex::encode(b))),
        ColumnData::Xml(v) => v.as_ref().map(|x| x.clone().into_owned().into_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(data)?.map(|v| v.format(DATETIME_FORMAT).to_string())
        }
        ColumnData::Date(_) => {
            temporal::<NaiveDate>(data)?.map(|v| v.format(DATE_FORMAT).to_string())
        }
        ColumnData::Time(_) => {
            temporal::<NaiveTime>(data)?.map(|v| v.format(TIME_FORMAT).to_string())
        }
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(data)?
            .map(|v| v.format(DATETIMEOFFSET_FORMAT).to_string()),
    };
    Ok(value)
}
