//! PostgreSQL connection handling.
//!
//! Every query opens its own connection, applies the session settings and
//! closes the connection when done.

use super::PostgresSource;
use super::type_mapping::decode_value;
use crate::Result;
use crate::adapters::{SourceConfig, redact_database_url};
use crate::error::SdcError;
use crate::models::{ResultSet, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement};
use std::str::FromStr;

impl PostgresSource {
    /// Creates a new PostgreSQL data source.
    ///
    /// # Errors
    /// Returns error if the connection string cannot be parsed.
    pub fn new(config: SourceConfig) -> Result<Self> {
        Self::validate_connection_string(&config.database_url)?;

        let options = PgConnectOptions::from_str(&config.database_url).map_err(|e| {
            SdcError::configuration(format!(
                "Invalid PostgreSQL connection string {}: {}",
                redact_database_url(&config.database_url),
                e
            ))
        })?;

        Ok(Self { options, config })
    }

    /// Validates the connection string shape before handing it to the driver.
    ///
    /// # Errors
    /// Returns error if the scheme is wrong or no host is given.
    pub(crate) fn validate_connection_string(connection_string: &str) -> Result<()> {
        let url = url::Url::parse(connection_string).map_err(|e| {
            SdcError::configuration(format!("Invalid PostgreSQL connection URL: {}", e))
        })?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(SdcError::configuration(format!(
                "Invalid scheme '{}' for PostgreSQL connection",
                url.scheme()
            )));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(SdcError::configuration(
                "PostgreSQL connection URL must specify a host",
            ));
        }

        Ok(())
    }

    /// Opens a new connection and applies session settings.
    ///
    /// # Session Settings
    /// - Read-only transactions when configured (the default)
    /// - UTC time zone for consistent timestamps
    /// - Application name for connection tracking
    pub(crate) async fn connect(&self) -> Result<PgConnection> {
        let mut conn = self
            .options
            .connect()
            .await
            .map_err(SdcError::connection_failed)?;

        if let Err(e) = self.setup_session(&mut conn).await {
            if let Err(close_err) = conn.close().await {
                tracing::warn!("Failed to close PostgreSQL connection: {}", close_err);
            }
            return Err(e);
        }

        Ok(conn)
    }

    async fn setup_session(&self, conn: &mut PgConnection) -> Result<()> {
        let app_name = format!("sdc-notebook-{}", env!("CARGO_PKG_VERSION"));
        conn.execute(format!("SET application_name = '{}'", app_name).as_str())
            .await
            .map_err(SdcError::connection_failed)?;

        if self.config.read_only {
            conn.execute("SET default_transaction_read_only = on")
                .await
                .map_err(SdcError::connection_failed)?;
        }

        conn.execute("SET timezone = 'UTC'")
            .await
            .map_err(SdcError::connection_failed)?;

        Ok(())
    }

    /// Runs `sql` on a fresh connection that is closed before returning,
    /// whatever the outcome of the query.
    pub(crate) async fn fetch_scoped(&self, sql: &str) -> Result<ResultSet> {
        let mut conn = self.connect().await?;
        let result = run_query(&mut conn, sql).await;

        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to close PostgreSQL connection: {}", e);
        }

        result
    }
}

/// Executes a query and decodes every row.
pub(crate) async fn run_query(conn: &mut PgConnection, sql: &str) -> Result<ResultSet> {
    tracing::debug!("PostgreSQL query: {}", sql);

    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SdcError::query_failed("PostgreSQL query failed", e))?;

    let columns: Vec<String> = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            let statement = Executor::prepare(&mut *conn, sql).await.map_err(|e| {
                SdcError::query_failed("PostgreSQL statement preparation failed", e)
            })?;
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        }
    };

    let mut result = ResultSet::new(columns);
    for row in &rows {
        let values = (0..row.len())
            .map(|index| decode_value(row, index))
            .collect::<Result<Vec<Value>>>()?;
        result.rows.push(values);
    }

    Ok(result)
}
