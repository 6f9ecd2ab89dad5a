//! Data source traits and factory for unified query access.
//!
//! This module defines the trait every data source implements so the query
//! layer can run the same grouped-count SQL against SQLite, PostgreSQL and
//! SQL Server. The design emphasizes object safety and scoped connections.
//!
//! # Module Structure
//! - `config`: Configuration types (`SourceConfig`)
//! - Driver-specific modules (sqlite, postgres, mssql)

use crate::{Result, error::SdcError, models::ResultSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Configuration module
pub mod config;

// Re-export configuration types for convenience
pub use config::{DATABASE_URL_ENV, DEFAULT_SAMPLE_LIMIT, SourceConfig};

/// Supported data source engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// SQLite database file
    Sqlite,
    /// PostgreSQL server
    PostgreSql,
    /// Microsoft SQL Server (ADO connection string)
    SqlServer,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceType::Sqlite => "SQLite",
            SourceType::PostgreSql => "PostgreSQL",
            SourceType::SqlServer => "SQL Server",
        };
        f.write_str(name)
    }
}

impl SourceType {
    /// SQL dialect spoken by this engine.
    pub fn dialect(self) -> Dialect {
        match self {
            SourceType::Sqlite => Dialect::Sqlite,
            SourceType::PostgreSql => Dialect::Postgres,
            SourceType::SqlServer => Dialect::SqlServer,
        }
    }
}

/// The few places where generated SQL differs between engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// `... LIMIT n`
    Sqlite,
    /// `... LIMIT n`
    Postgres,
    /// `SELECT TOP n ...`
    SqlServer,
}

impl Dialect {
    /// Builds a query reading only the first `limit` rows of `table`.
    ///
    /// # Example
    /// ```rust
    /// use sdc_core::adapters::Dialect;
    ///
    /// assert_eq!(
    ///     Dialect::SqlServer.limit_query("Region", "Therapeutics", 10000),
    ///     "SELECT TOP 10000 Region FROM Therapeutics"
    /// );
    /// assert_eq!(
    ///     Dialect::Sqlite.limit_query("Region", "Therapeutics", 10000),
    ///     "SELECT Region FROM Therapeutics LIMIT 10000"
    /// );
    /// ```
    pub fn limit_query(&self, select_list: &str, table: &str, limit: u32) -> String {
        match self {
            Dialect::SqlServer => format!("SELECT TOP {} {} FROM {}", limit, select_list, table),
            Dialect::Sqlite | Dialect::Postgres => {
                format!("SELECT {} FROM {} LIMIT {}", select_list, table, limit)
            }
        }
    }
}

/// A tabular data source the query layer reads from.
///
/// # Connection Scope
/// Implementations open a connection for each call and close it before
/// returning, on success and on failure alike. No connection outlives a
/// single query.
///
/// # Security
/// - Queries are passed through as given; callers are trusted
/// - Connections are read-only where the driver supports it
/// - Connection strings are redacted in every error and log line
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn DataSource>`.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Opens a connection, runs a trivial query and closes it again.
    ///
    /// # Errors
    /// Returns error if the connection cannot be established.
    async fn test_connection(&self) -> Result<()>;

    /// Runs a query on a fresh connection and returns every row.
    ///
    /// # Errors
    /// Returns error if connecting, executing or decoding fails.
    async fn fetch(&self, sql: &str) -> Result<ResultSet>;

    /// Returns the engine this source talks to.
    fn source_type(&self) -> SourceType;

    /// Gets the source configuration (print it, it is redacted).
    fn config(&self) -> &SourceConfig;

    /// SQL dialect for generated queries.
    fn dialect(&self) -> Dialect {
        self.source_type().dialect()
    }
}

/// Factory function to create a data source from a connection string.
///
/// # Arguments
/// * `connection_string` - URL or ADO string (sanitized in errors)
///
/// # Errors
/// Returns error if:
/// - Connection string format is invalid
/// - The engine's driver feature is not compiled in
pub fn create_data_source(connection_string: &str) -> Result<Box<dyn DataSource>> {
    create_data_source_with_config(SourceConfig::new(connection_string))
}

/// Factory function to create a data source from a full configuration.
///
/// No connection is opened here; each query opens its own.
///
/// # Errors
/// Returns error if the configuration is invalid or the engine is unsupported.
pub fn create_data_source_with_config(config: SourceConfig) -> Result<Box<dyn DataSource>> {
    config.validate()?;
    let source_type = detect_source_type(&config.database_url)?;
    tracing::debug!(
        "Creating {} data source for {}",
        source_type,
        redact_database_url(&config.database_url)
    );

    match source_type {
        SourceType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                Ok(Box::new(sqlite::SqliteSource::new(config)?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                Err(SdcError::unsupported_feature(
                    "SQLite data source",
                    "Compile with --features sqlite to enable SQLite support",
                ))
            }
        }
        SourceType::PostgreSql => {
            #[cfg(feature = "postgresql")]
            {
                Ok(Box::new(postgres::PostgresSource::new(config)?))
            }
            #[cfg(not(feature = "postgresql"))]
            {
                Err(SdcError::unsupported_feature(
                    "PostgreSQL data source",
                    "Compile with --features postgresql to enable PostgreSQL support",
                ))
            }
        }
        SourceType::SqlServer => {
            #[cfg(feature = "mssql")]
            {
                Ok(Box::new(mssql::SqlServerSource::new(config)?))
            }
            #[cfg(not(feature = "mssql"))]
            {
                Err(SdcError::unsupported_feature(
                    "SQL Server data source",
                    "Compile with --features mssql to enable SQL Server support",
                ))
            }
        }
    }
}

/// Safely redacts credentials from connection strings.
///
/// This function delegates to `crate::error::redact_database_url`.
#[inline]
pub fn redact_database_url(url: &str) -> String {
    crate::error::redact_database_url(url)
}

/// Detects the engine from a connection string.
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_source_type(connection_string: &str) -> Result<SourceType> {
    let trimmed = connection_string.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        Ok(SourceType::PostgreSql)
    } else if lower.starts_with("sqlite:")
        || lower == ":memory:"
        || lower.ends_with(".db")
        || lower.ends_with(".sqlite")
        || lower.ends_with(".sqlite3")
    {
        Ok(SourceType::Sqlite)
    } else if lower.starts_with("mssql://")
        || lower.starts_with("sqlserver://")
        || (trimmed.contains('=') && trimmed.contains(';') && lower.contains("server="))
    {
        Ok(SourceType::SqlServer)
    } else {
        Err(SdcError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}

// Database-specific data source modules
#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mssql")]
pub mod mssql;
