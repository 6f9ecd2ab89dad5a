//! SQLite connection handling.
//!
//! SQLite uses file-based databases, so each query simply opens the file,
//! runs and closes it again.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - Bare paths ending in `.db`, `.sqlite` or `.sqlite3`
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! # Security Features
//! - Opens databases in read-only mode by default
//! - No network access required

use super::SqliteSource;
use super::type_mapping::decode_value;
use crate::Result;
use crate::adapters::SourceConfig;
use crate::error::SdcError;
use crate::models::{ResultSet, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, ConnectOptions, Connection, Row, Statement};
use std::str::FromStr;

impl SqliteSource {
    /// Creates a new SQLite data source.
    ///
    /// Only the connection options are parsed here; the file is opened by
    /// each query.
    ///
    /// # Errors
    /// Returns error if the connection string cannot be parsed.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let normalized = normalize_connection_string(&config.database_url);

        let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
            SdcError::configuration(format!("Invalid SQLite connection string: {}", e))
        })?;

        // Configure for read-only access if requested
        if config.read_only {
            options = options.read_only(true);
        }

        Ok(Self { options, config })
    }

    /// Checks if the source is an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.config.database_url.contains(":memory:")
            || self.config.database_url.contains("mode=memory")
    }

    /// Opens a new connection for a single query.
    pub(crate) async fn connect(&self) -> Result<SqliteConnection> {
        self.options
            .connect()
            .await
            .map_err(SdcError::connection_failed)
    }

    /// Runs `sql` on a fresh connection that is closed before returning,
    /// whatever the outcome of the query.
    pub(crate) async fn fetch_scoped(&self, sql: &str) -> Result<ResultSet> {
        let mut conn = self.connect().await?;
        let result = run_query(&mut conn, sql).await;

        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to close SQLite connection: {}", e);
        }

        result
    }
}

/// Executes a query and decodes every row.
pub(crate) async fn run_query(conn: &mut SqliteConnection, sql: &str) -> Result<ResultSet> {
    tracing::debug!("SQLite query: {}", sql);

    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| SdcError::query_failed("SQLite query failed", e))?;

    let columns: Vec<String> = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        None => {
            // No rows to read names from; describe the statement instead
            let statement = sqlx::Executor::prepare(&mut *conn, sql)
                .await
                .map_err(|e| SdcError::query_failed("SQLite statement preparation failed", e))?;
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

/// Normalizes connection string to SQLite URL format.
pub(crate) fn normalize_connection_string(connection_string: &str) -> String {
    let trimmed = connection_string.trim();

    if trimmed == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if trimmed.starts_with("sqlite:") {
        return trimmed.to_string();
    }

    format!("sqlite://{}", trimmed)
}
