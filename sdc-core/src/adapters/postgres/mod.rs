//! PostgreSQL data source.
//!
//! # Module Structure
//! - `connection`: Per-query connections with session settings
//! - `type_mapping`: PostgreSQL cell to [`crate::models::Value`] conversion
//!
//! # Security Guarantees
//! - Sessions default to read-only transactions
//! - Connection strings are sanitized in error messages

mod connection;
mod type_mapping;


use super::{DataSource, SourceConfig, SourceType};
use crate::Result;
use crate::error::SdcError;
use crate::models::{ResultSet, Value};
use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;

// Re-export public items from submodules
pub use type_mapping::{PgValueKind, decode_value, map_postgres_type};

/// PostgreSQL data source opening one connection per query.
pub struct PostgresSource {
    options: PgConnectOptions,
    config: SourceConfig,
}

impl std::fmt::Debug for PostgresSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for PostgresSource {
    async fn test_connection(&self) -> Result<()> {
        let result = self.fetch_scoped("SELECT 1::int8 AS ok").await?;

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
        SourceType::PostgreSql
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }
}
