//! Configuration types for data sources.
//!
//! - `SourceConfig`: connection string, read-only flag, fallback sample limit
//!
//! # Security
//! The connection string is only ever printed in redacted form.

mod connection;

pub use connection::{DATABASE_URL_ENV, DEFAULT_SAMPLE_LIMIT, SourceConfig};
