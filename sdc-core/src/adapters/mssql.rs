//! SQL Server data source using `tiberius`.
//!
//! Connection strings are ADO-style `key=value;` pairs as published in
//! `FULL_DATABASE_URL`, for example
//! `Server=tcp:db.example,1433;Database=tpp;User Id=reader;Password=...;`.
//! Each query opens a TCP connection, runs and closes it.

use super::{DataSource, SourceConfig, SourceType, redact_database_url};
use crate::Result;
use crate::error::SdcError;
use crate::models::{ResultSet, Value};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type SqlServerClient = Client<Compat<TcpStream>>;

/// SQL Server data source opening one connection per query.
pub struct SqlServerSource {
    client_config: Config,
    config: SourceConfig,
}

impl std::fmt::Debug for SqlServerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlServerSource {
    /// Creates a new SQL Server data source from an ADO connection string.
    ///
    /// # Errors
    /// Returns error if the connection string cannot be parsed.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client_config = Config::from_ado_string(&config.database_url).map_err(|e| {
            SdcError::configuration(format!(
                "Invalid SQL Server connection string {}: {}",
                redact_database_url(&config.database_url),
                e
            ))
        })?;

        Ok(Self {
            client_config,
            config,
        })
    }

    async fn connect(&self) -> Result<SqlServerClient> {
        let tcp = TcpStream::connect(self.client_config.get_addr())
            .await
            .map_err(SdcError::connection_failed)?;
        tcp.set_nodelay(true)
            .map_err(SdcError::connection_failed)?;

        Client::connect(self.client_config.clone(), tcp.compat_write())
            .await
            .map_err(SdcError::connection_failed)
    }

    /// Runs `sql` on a fresh connection that is closed before returning,
    /// whatever the outcome of the query.
    async fn fetch_scoped(&self, sql: &str) -> Result<ResultSet> {
        let mut client = self.connect().await?;
        let result = run_query(&mut client, sql).await;

        if let Err(e) = client.close().await {
            tracing::warn!("Failed to close SQL Server connection: {}", e);
        }

        result
    }
}

async fn run_query(client: &mut SqlServerClient, sql: &str) -> Result<ResultSet> {
    tracing::debug!("SQL Server query: {}", sql);

    let mut stream = client
        .simple_query(sql)
        .await
        .map_err(|e| SdcError::query_failed("SQL Server query failed", e))?;

    let columns: Vec<String> = stream
        .columns()
        .await
        .map_err(|e| SdcError::query_failed("SQL Server query failed", e))?
        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| SdcError::query_failed("SQL Server query failed", e))?;

    let mut result = ResultSet::new(columns);
    for row in rows {
        let values = row
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                let name = result.columns.get(index).map_or("", String::as_str);
                decode_value(&data, name)
            })
            .collect::<Result<Vec<Value>>>()?;
        result.rows.push(values);
    }

    Ok(result)
}

/// Decodes one SQL Server cell.
///
/// # Errors
/// Returns a decode error if a date/time value cannot be converted.
#[allow(clippy::cast_precision_loss)]
pub fn decode_value(data: &ColumnData<'static>, column: &str) -> Result<Value> {
    let value = match data {
        ColumnData::Bit(v) => v.map_or(Value::Null, Value::Bool),
        ColumnData::U8(v) => v.map_or(Value::Null, |n| Value::Int(i64::from(n))),
        ColumnData::I16(v) => v.map_or(Value::Null, |n| Value::Int(i64::from(n))),
        ColumnData::I32(v) => v.map_or(Value::Null, |n| Value::Int(i64::from(n))),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::Int),
        ColumnData::F32(v) => v.map_or(Value::Null, |n| Value::Float(f64::from(n))),
        ColumnData::F64(v) => v.map_or(Value::Null, Value::Float),
        ColumnData::Numeric(v) => v.map_or(Value::Null, |n| {
            let scale = 10f64.powi(i32::from(n.scale()));
            Value::Float(n.value() as f64 / scale)
        }),
        ColumnData::String(v) => v
            .as_ref()
            .map_or(Value::Null, |s| Value::Text(s.to_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(|e| SdcError::decode_column(column, e))?
            .map_or(Value::Null, Value::Date),
        ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_) => NaiveDateTime::from_sql(data)
            .map_err(|e| SdcError::decode_column(column, e))?
            .map_or(Value::Null, Value::DateTime),
        ColumnData::DateTimeOffset(_) => {
            chrono::DateTime::<chrono::Utc>::from_sql(data)
                .map_err(|e| SdcError::decode_column(column, e))?
                .map_or(Value::Null, |dt| Value::DateTime(dt.naive_utc()))
        }
        ColumnData::Guid(v) => v.map_or(Value::Null, |g| Value::Text(g.to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(|e| SdcError::decode_column(column, e))?
            .map_or(Value::Null, |t| Value::Text(t.format("%H:%M:%S").to_string())),
        ColumnData::Binary(v) => match v {
            Some(bytes) => Value::Text(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| SdcError::decode_column(column, e))?,
            ),
            None => Value::Null,
        },
        ColumnData::Xml(_) => return Err(SdcError::unsupported_column_type(column, "XML")),
    };

    Ok(value)
}

#[async_trait]
impl DataSource for SqlServerSource {
    async fn test_connection(&self) -> Result<()> {
        let result = self.fetch_scoped("SELECT CAST(1 AS BIGINT) AS ok").await?;

        if result.value(0, 0) != &Value::Int(1) {
            return Err(SdcError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }

        Ok(())
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet> {
        self.fetch_scoped(sql).await
    }

    fn source_type(&self) -> SourceType {
        SourceType::SqlServer
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }
}
