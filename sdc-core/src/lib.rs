//! Statistical disclosure control summaries of clinical tables.
//!
//! This crate queries a relational data source for grouped counts, applies
//! suppression and rounding rules, and builds summaries that are safe to
//! display or export.
//!
//! # Disclosure Guarantees
//! - Counts at or below 7 are never displayed
//! - Displayed counts are rounded (nearest 5, or nearest 10 for substrings)
//! - Report types hold only disclosed counts, never raw ones
//! - Connection strings are redacted in every error and log line
//!
//! # Architecture
//! - `adapters`: data sources behind the async `DataSource` trait, chosen
//!   from the connection string
//! - `query`: grouped count queries
//! - `disclosure`: the suppression/rounding engine
//! - `summary`: the summaries built on top of both
//! - `export`: CSV and Markdown output
//! - `study`: declarative study definitions

pub mod adapters;
pub mod disclosure;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod query;
pub mod study;
pub mod summary;

// Re-export commonly used types
pub use adapters::{
    DataSource, Dialect, SourceConfig, SourceType, create_data_source,
    create_data_source_with_config,
};
pub use disclosure::{
    DisclosedCount, SmallCount, SuppressionOutcome, SuppressionPolicy, add_percentage_column,
    redact_small_numbers, round_and_suppress_count, suppress_and_round,
};
pub use error::{Result, SdcError};
pub use export::{Tabular, render_markdown, write_csv, write_csv_to};
pub use logging::init_logging;
pub use models::{AggregateResult, AggregateRow, ResultSet, Value, ValueKind};
pub use query::{joined_pair_sql, simple_sql};
pub use study::{StudyDefinition, load_study_definition, validate_study_definition};
