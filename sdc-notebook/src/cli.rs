//! Command-line interface of the notebook driver.

use clap::{Args, Parser, Subcommand};
use sdc_core::adapters::{DATABASE_URL_ENV, DEFAULT_SAMPLE_LIMIT};
use sdc_core::summary::ProblemDatesOptions;
use sdc_core::{Result, SourceConfig};
use std::path::PathBuf;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "sdc-notebook")]
#[command(about = "Disclosure-controlled description of the therapeutics dataset")]
#[command(version)]
#[command(long_about = "
SDC Notebook - disclosure-controlled summaries of clinical tables

Every count shown is rounded to the nearest 5 and counts of 7 or fewer are
withheld (substring counts are rounded to the nearest 10).

CONNECTION:
  The connection string is read from --database-url, or from the
  FULL_DATABASE_URL environment variable (surrounding quotes are stripped).
  - SQLite (sqlite:// or .db files)
  - PostgreSQL (postgres://)
  - SQL Server (Server=...;Database=...) [if compiled with --features mssql]

EXAMPLES:
  sdc-notebook describe
  sdc-notebook describe --inpatients --output-dir output/
  sdc-notebook problem-dates Therapeutics Received TreatmentStartDate
  sdc-notebook validate-study studies/therapeutics.json
")]
pub struct Cli {
    /// Verbosity flags
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Database connection string (falls back to FULL_DATABASE_URL)
    #[arg(
        long,
        global = true,
        help = "Database connection string (credentials will be sanitized in logs)"
    )]
    pub database_url: Option<String>,

    /// Rows read by the schema sampling fallback
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_SAMPLE_LIMIT,
        help = "Rows sampled when a schema count query fails"
    )]
    pub sample_limit: u32,

    /// Directory for CSV exports
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Write exportable tables as CSV files into this directory"
    )]
    pub output_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Describe the therapeutics table
    Describe(DescribeArgs),
    /// Report malformed date values
    ProblemDates(ProblemDatesArgs),
    /// Count records containing substrings
    Substrings(SubstringsArgs),
    /// Test the database connection
    Test,
    /// Validate a study definition document
    ValidateStudy(ValidateStudyArgs),
}

/// Arguments of `describe`
#[derive(Debug, Args)]
pub struct DescribeArgs {
    /// Table to describe
    #[arg(long, default_value = "Therapeutics")]
    pub table: String,

    /// Describe hospitalised patients only
    #[arg(long, help = "Restrict every summary to hospitalised patients")]
    pub inpatients: bool,
}

/// Arguments of `problem-dates`
#[derive(Debug, Args)]
pub struct ProblemDatesArgs {
    /// Table to check
    pub table: String,

    /// Date columns to check
    #[arg(required = true)]
    pub columns: Vec<String>,

    /// Predicate fragment restricting the rows
    #[arg(long = "where", value_name = "PREDICATE")]
    pub filter: Option<String>,

    /// Year prefixes accepted as valid
    #[arg(long, value_delimiter = ',', default_values_t = ProblemDatesOptions::default().valid_years)]
    pub valid_years: Vec<String>,

    /// Only print the roll-up per problem
    #[arg(long)]
    pub summary_only: bool,
}

impl ProblemDatesArgs {
    /// Options for the summary function.
    pub fn options(&self) -> ProblemDatesOptions {
        ProblemDatesOptions::default()
            .with_valid_years(self.valid_years.clone())
            .with_summary_only(self.summary_only)
    }
}

/// Arguments of `substrings`
#[derive(Debug, Args)]
pub struct SubstringsArgs {
    /// Table to search
    pub table: String,

    /// Free-text columns to search
    #[arg(required = true)]
    pub columns: Vec<String>,

    /// Substrings to count (repeat or comma-separate)
    #[arg(long = "substring", short = 's', value_delimiter = ',', required = true)]
    pub substrings: Vec<String>,

    /// Predicate fragment restricting the rows
    #[arg(long = "where", value_name = "PREDICATE")]
    pub filter: Option<String>,

    /// Add the counts of all columns together
    #[arg(long)]
    pub merge_all: bool,
}

/// Arguments of `validate-study`
#[derive(Debug, Args)]
pub struct ValidateStudyArgs {
    /// Path of the study definition JSON document
    pub path: PathBuf,

    /// Print the validated definition as normalized JSON
    #[arg(long)]
    pub print: bool,
}

/// Global verbosity arguments
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

impl Cli {
    /// Source configuration from `--database-url` or `FULL_DATABASE_URL`.
    ///
    /// # Errors
    /// Returns a configuration error if neither is set or the result is
    /// invalid.
    pub fn source_config(&self) -> Result<SourceConfig> {
        let config = match &self.database_url {
            Some(url) => SourceConfig::new(url.trim().trim_matches('"')),
            None => SourceConfig::from_env().map_err(|_| {
                sdc_core::SdcError::configuration(format!(
                    "No database URL: pass --database-url or set {}",
                    DATABASE_URL_ENV
                ))
            })?,
        }
        .with_sample_limit(self.sample_limit);

        config.validate()?;
        Ok(config)
    }
}
