//! SQLite data source.
//!
//! # Module Structure
//! - `connection`: Per-query connection handling and row decoding
//! - `type_mapping`: SQLite cell to [`crate::models::Value`] conversion
//!
//! # Security Guarantees
//! - Database files are opened read-only by default
//! - No network access required

pub mod connection;
pub mod type_mapping;

#[cfg(test)]
mod tests;

use super::{DataSource, SourceConfig, SourceType};
use crate::Result;
use crate::error::SdcError;
use crate::models::ResultSet;
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;

// Re-export public items from submodules
pub use type_mapping::{DeclaredType, classify_declared_type, decode_value};

/// SQLite data source opening one connection per query.
pub struct SqliteSource {
    /// Parsed connection options (read-only unless configured otherwise)
    options: SqliteConnectOptions,
    /// Source configuration
    config: SourceConfig,
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("config", &self.config)
            .field("is_in_memory", &self.is_in_memory())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn test_connection(&self) -> Result<()> {
        let result = self.fetch_scoped("SELECT 1 AS ok").await?;

        if result.value(0, 0) != &crate::models::Value::Int(1) {
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
        SourceType::Sqlite
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }
}
