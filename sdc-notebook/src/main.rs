//! Disclosure-controlled notebook driver.
//!
//! This binary replays the therapeutics description notebooks against a
//! data source and prints Markdown, exporting tables as CSV on request.
//!
//! # Disclosure Guarantees
//! - Every displayed count is rounded; counts of 7 or fewer are withheld
//! - Read-only database access, one connection per query
//! - Connection strings are redacted in logs and errors

use clap::Parser;
use sdc_core::{
    Result, SdcError, create_data_source_with_config, error::redact_database_url, init_logging,
    load_study_definition,
};
use sdc_notebook::cli::ValidateStudyArgs;
use sdc_notebook::{
    Cli, Command, NotebookOutput, Step, Variant, run_notebook, run_step,
    therapeutics_description,
};
use std::io::{self, Write};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    match &cli.command {
        Command::Describe(args) => {
            let variant = if args.inpatients {
                Variant::Inpatients
            } else {
                Variant::AllPatients
            };
            let sections = therapeutics_description(&args.table, variant);
            let source = connect(&cli)?;
            let mut output = NotebookOutput::new(io::stdout().lock(), cli.output_dir.clone());
            run_notebook(source.as_ref(), &sections, &mut output).await?;
            report_exports(&output);
            output.finish()?;
            Ok(())
        }
        Command::ProblemDates(args) => {
            let step = Step::ProblemDates {
                table: args.table.clone(),
                columns: args.columns.clone(),
                filter: args.filter.clone(),
                options: args.options(),
            };
            run_single(&cli, &step).await
        }
        Command::Substrings(args) => {
            let step = Step::Substrings {
                table: args.table.clone(),
                columns: args.columns.clone(),
                substrings: args.substrings.clone(),
                filter: args.filter.clone(),
                merge_all: args.merge_all,
            };
            run_single(&cli, &step).await
        }
        Command::Test => test_connection(&cli).await,
        Command::ValidateStudy(args) => validate_study(args),
    }
}

/// Validates a study definition and prints its outline
fn validate_study(args: &ValidateStudyArgs) -> Result<()> {
    let study = match load_study_definition(&args.path) {
        Ok(study) => study,
        Err(SdcError::StudyValidation { errors }) => {
            error!("Study definition {} is invalid", args.path.display());
            for message in &errors {
                eprintln!("  - {}", message);
            }
            return Err(SdcError::StudyValidation { errors });
        }
        Err(e) => return Err(e),
    };

    info!("✓ Study definition is valid");
    if args.print {
        let json = serde_json::to_string_pretty(&study).map_err(|e| SdcError::Serialization {
            context: "Failed to serialize study definition".to_string(),
            source: e,
        })?;
        println!("{}", json);
    } else {
        println!(
            "{}: {} variables, {} codelists, index date {}",
            args.path.display(),
            study.variables.len(),
            study.codelists.len(),
            study.index_date
        );
    }
    Ok(())
}

/// Creates the data source named by the CLI or `FULL_DATABASE_URL`.
fn connect(cli: &Cli) -> Result<Box<dyn sdc_core::DataSource>> {
    let config = cli.source_config()?;
    info!("Target: {}", redact_database_url(&config.database_url));

    create_data_source_with_config(config).map_err(|e| {
        error!("Failed to create data source: {}", e);
        e
    })
}

/// Runs one step outside a notebook.
async fn run_single(cli: &Cli, step: &Step) -> Result<()> {
    let source = connect(cli)?;
    let mut output = NotebookOutput::new(io::stdout().lock(), cli.output_dir.clone());
    output.prepare().await?;
    run_step(source.as_ref(), step, &mut output).await?;
    report_exports(&output);
    output.finish()?;
    Ok(())
}

fn report_exports<W: Write>(output: &NotebookOutput<W>) {
    if let Some(dir) = output.export_dir() {
        info!(
            "✓ {} tables exported to {}",
            output.exported().len(),
            dir.display()
        );
    }
}

/// Tests the database connection without running any summary
async fn test_connection(cli: &Cli) -> Result<()> {
    info!("Testing database connection...");
    let source = connect(cli)?;

    source.test_connection().await.map_err(|e| {
        error!("Connection test failed: {}", e);
        e
    })?;

    info!("✓ Connection test successful");
    println!("Connection to {} source successful", source.source_type());
    Ok(())
}
