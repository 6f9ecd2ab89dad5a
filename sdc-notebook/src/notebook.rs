//! The therapeutics description notebooks as a list of steps.
//!
//! A notebook is a sequence of [`Section`]s, each a heading and the
//! summaries shown under it. [`therapeutics_description`] builds the
//! published notebook (all patients, plus the non-hospitalised subset) or
//! its inpatient variant; [`run_notebook`] executes the steps in order
//! against a data source.

use crate::output::NotebookOutput;
use sdc_core::summary::{
    DistinctValuesOptions, ProblemDatesOptions, SchemaFilter, SchemaSummaryOptions,
    StringSplitOptions, compare_two_values, count_substrings, distinct_values,
    identify_distinct_strings, multiple_records, problem_dates, schema_summary,
};
use sdc_core::{DataSource, Result};
use std::io::Write;

/// Predicate selecting non-hospitalised patients.
pub const NON_HOSPITALISED: &str = "COVID_indication='non_hospitalised'";

/// Predicate selecting hospitalised patients.
pub const HOSPITALISED: &str = "COVID_indication IN ('hospitalised_with','hospital_onset')";

/// Latest date expected in the dataset.
pub const LATEST_EXPECTED_DATE: &str = "2023-06-28";

/// Start of the treatment campaign.
pub const CAMPAIGN_START: &str = "2021-12-16";

const GENERAL_THRESHOLD: usize = 50;

/// Which patients a notebook describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// All patients, each summary repeated for non-hospitalised patients
    AllPatients,
    /// Hospitalised patients only
    Inpatients,
}

impl Variant {
    /// Filters each summary runs under.
    pub fn filters(self) -> Vec<Option<String>> {
        match self {
            Variant::AllPatients => vec![None, Some(NON_HOSPITALISED.to_string())],
            Variant::Inpatients => vec![Some(HOSPITALISED.to_string())],
        }
    }

    fn schema_filters(self) -> Vec<SchemaFilter> {
        match self {
            Variant::AllPatients => vec![
                SchemaFilter::unfiltered(),
                SchemaFilter::new("_non_hospitalised", NON_HOSPITALISED),
            ],
            Variant::Inpatients => vec![SchemaFilter::new("_hospitalised", HOSPITALISED)],
        }
    }

    fn title(self) -> &'static str {
        match self {
            Variant::AllPatients => "COVID therapeutics dataset in OpenSAFELY-TPP",
            Variant::Inpatients => {
                "COVID therapeutics dataset in OpenSAFELY-TPP, filtered on Hospitalised patients."
            }
        }
    }
}

/// Joins two predicate fragments with `AND`.
pub fn and_filter(base: Option<&str>, extra: &str) -> String {
    match base {
        Some(base) => format!("{} AND {}", base, extra),
        None => extra.to_string(),
    }
}

/// One summary shown in a notebook.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Free text
    Text(String),
    /// [`schema_summary`]
    Schema {
        /// Table
        table: String,
        /// Filters and supplementary tables
        options: SchemaSummaryOptions,
    },
    /// [`distinct_values`]
    DistinctValues {
        /// Table
        table: String,
        /// Columns, one summary each
        columns: Vec<String>,
        /// Predicate fragment
        filter: Option<String>,
        /// Display options
        options: DistinctValuesOptions,
    },
    /// [`compare_two_values`]
    Compare {
        /// One table, or two joined on `join_on`
        tables: Vec<String>,
        /// The two columns
        columns: Vec<String>,
        /// Join key for two tables
        join_on: Option<String>,
        /// Predicate fragment
        filter: Option<String>,
    },
    /// [`identify_distinct_strings`]
    DistinctStrings {
        /// Table
        table: String,
        /// Free-text columns
        columns: Vec<String>,
        /// Predicate fragment
        filter: Option<String>,
        /// Replacement and split options
        options: StringSplitOptions,
    },
    /// [`count_substrings`]
    Substrings {
        /// Table
        table: String,
        /// Free-text columns
        columns: Vec<String>,
        /// Substrings to count
        substrings: Vec<String>,
        /// Predicate fragment
        filter: Option<String>,
        /// Add the column counts together
        merge_all: bool,
    },
    /// [`multiple_records`]
    MultipleRecords {
        /// Table
        table: String,
        /// Fields compared between a key's records
        fields: Vec<String>,
        /// Field pairs that must both differ
        combinations: Vec<(String, String)>,
        /// Key identifying a patient
        key_field: String,
        /// Predicate fragment
        filter: Option<String>,
    },
    /// [`problem_dates`]
    ProblemDates {
        /// Table
        table: String,
        /// Date columns
        columns: Vec<String>,
        /// Predicate fragment
        filter: Option<String>,
        /// Valid years and summary mode
        options: ProblemDatesOptions,
    },
}

/// A heading and the steps under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Heading level (1 = `#`)
    pub level: usize,
    /// Heading text
    pub title: String,
    /// Steps in display order
    pub steps: Vec<Step>,
}

impl Section {
    fn new(level: usize, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            steps: Vec::new(),
        }
    }

    fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn distinct(
    table: &str,
    columns: &[&str],
    filter: Option<String>,
    options: DistinctValuesOptions,
) -> Step {
    Step::DistinctValues {
        table: table.to_string(),
        columns: strings(columns),
        filter,
        options,
    }
}

/// Builds the description notebook of `table` for `variant`.
#[allow(clippy::too_many_lines)]
pub fn therapeutics_description(table: &str, variant: Variant) -> Vec<Section> {
    let filters = variant.filters();
    let general = DistinctValuesOptions::default().with_threshold(GENERAL_THRESHOLD);
    let mut sections = Vec::new();

    sections.push(Section::new(1, variant.title()).step(Step::Text(format!(
        "**Note: all row/patient counts are rounded to the nearest 5 and counts <=7 removed**\n\n\
         The last final update of the data was on {}.",
        LATEST_EXPECTED_DATE
    ))));

    let schema_options = SchemaSummaryOptions {
        filters: variant.schema_filters(),
        supplementary_separator: None,
    };
    sections.push(Section::new(2, "Import schema").step(Step::Schema {
        table: table.to_string(),
        options: schema_options,
    }));

    let general_fields = ["Diagnosis", "FormName", "Region", "Der_LoadDate", "AgeAtReceivedDate"];
    let categories = ["COVID_indication", "Intervention", "CurrentStatus", "Count"];
    sections.push(
        Section::new(2, "Description of General Fields")
            .steps(filters.iter().map(|f| {
                distinct(table, &general_fields, f.clone(), general.with_include_counts(false))
            }))
            .steps(
                filters
                    .iter()
                    .map(|f| distinct(table, &categories, f.clone(), general)),
            ),
    );

    let dates = ["Received", "TreatmentStartDate"];
    sections.push(Section::new(2, "Description of Dates").steps(filters.iter().map(|f| {
        distinct(table, &dates, f.clone(), general.with_sort_by_value(true))
    })));

    let out_of_range = DistinctValuesOptions::default()
        .with_threshold(3)
        .with_sort_by_value(true);
    let mut range_checks = Vec::new();
    for column in dates {
        let after = format!("CAST({} AS DATE) >'{}'", column, LATEST_EXPECTED_DATE);
        let before = format!("CAST({} AS DATE) <'{}'", column, CAMPAIGN_START);
        let mut checks = vec![after];
        if variant == Variant::AllPatients {
            checks.push(before);
        }
        for check in &checks {
            for filter in &filters {
                range_checks.push(distinct(
                    table,
                    &[column],
                    Some(and_filter(filter.as_deref(), check)),
                    out_of_range,
                ));
            }
        }
    }
    sections.push(Section::new(3, "Past and future dates").steps(range_checks));

    sections.push(
        Section::new(3, "Date comparisons").steps(filters.iter().map(|f| Step::Compare {
            tables: strings(&[table]),
            columns: strings(&dates),
            join_on: None,
            filter: f.clone(),
        })),
    );

    sections.push(
        Section::new(3, "Problem dates").steps(filters.iter().map(|f| Step::ProblemDates {
            table: table.to_string(),
            columns: strings(&dates),
            filter: f.clone(),
            options: ProblemDatesOptions::default(),
        })),
    );

    let risk_columns = ["MOL1_high_risk_cohort", "SOT02_risk_cohorts", "CASIM05_risk_cohort"];
    if variant == Variant::AllPatients {
        sections.push(symptom_onset_section(table));

        let split = StringSplitOptions::default()
            .with_replacement("Patients with a ")
            .with_split_on(" and ")
            .with_merge_all(true);
        sections.push(
            Section::new(2, "Distinct risk groups").steps(filters.iter().map(|f| {
                Step::DistinctStrings {
                    table: table.to_string(),
                    columns: strings(&risk_columns),
                    filter: f.clone(),
                    options: split.clone(),
                }
            })),
        );
    }

    let patients = DistinctValuesOptions::default()
        .with_threshold(GENERAL_THRESHOLD)
        .with_frequency_count(variant == Variant::Inpatients);
    sections.push(
        Section::new(2, "Patients with multiple records").steps(
            filters
                .iter()
                .map(|f| distinct(table, &["patient_id"], f.clone(), patients)),
        ),
    );

    let fields_of_interest = [
        "AgeAtReceivedDate",
        "Received",
        "Intervention",
        "CurrentStatus",
        "TreatmentStartDate",
        "Region",
        "MOL1_high_risk_cohort",
        "SOT02_risk_cohorts",
        "CASIM05_risk_cohort",
    ];
    let combinations = vec![
        ("Intervention".to_string(), "Received".to_string()),
        ("Intervention".to_string(), "TreatmentStartDate".to_string()),
    ];
    sections.push(
        Section::new(
            3,
            "Further investigation into patients with multiple records - which fields differ in each record?",
        )
        .steps(filters.iter().map(|f| Step::MultipleRecords {
            table: table.to_string(),
            fields: strings(&fields_of_interest),
            combinations: combinations.clone(),
            key_field: sdc_core::summary::DEFAULT_KEY_FIELD.to_string(),
            filter: f.clone(),
        })),
    );

    sections
}

fn symptom_onset_section(table: &str) -> Section {
    let onset = [
        ("MOL1_onset_of_symptoms", "Molnupiravir", 50),
        ("SOT02_onset_of_symptoms", "Sotrovimab", 50),
        ("CASIM05_date_of_symptom_onset", "Casirivimab and imdevimab", 1),
    ];
    let cohorts = [
        ("MOL1_high_risk_cohort", "Molnupiravir"),
        ("SOT02_risk_cohorts", "Sotrovimab"),
        ("CASIM05_risk_cohort", "Casirivimab and imdevimab"),
    ];

    let mut steps = Vec::new();
    for (column, intervention, threshold) in onset {
        let options = DistinctValuesOptions::default().with_threshold(threshold);
        let treated = format!("Intervention='{}'", intervention);
        for filter in [
            None,
            Some(treated.clone()),
            Some(NON_HOSPITALISED.to_string()),
            Some(and_filter(Some(NON_HOSPITALISED), &treated)),
        ] {
            steps.push(distinct(table, &[column], filter, options));
        }
    }

    let options = DistinctValuesOptions::default().with_threshold(GENERAL_THRESHOLD);
    for (column, intervention) in cohorts {
        let treated = format!("Intervention='{}'", intervention);
        for filter in [
            Some(treated.clone()),
            Some(and_filter(Some(NON_HOSPITALISED), &treated)),
        ] {
            steps.push(distinct(table, &[column], filter, options));
        }
    }

    Section::new(2, "Symptom onset dates and At-Risk groups").steps(steps)
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

/// Runs one step and writes its output.
///
/// # Errors
/// Returns the first query, output or export error.
pub async fn run_step<W: Write>(
    source: &dyn DataSource,
    step: &Step,
    output: &mut NotebookOutput<W>,
) -> Result<()> {
    match step {
        Step::Text(text) => output.display(text)?,
        Step::Schema { table, options } => {
            let summary = schema_summary(source, table, options).await?;
            for table_summary in &summary.tables {
                output.display(table_summary)?;
                output.export(table_summary, &table_summary.export_file_name())?;
            }
        }
        Step::DistinctValues {
            table,
            columns,
            filter,
            options,
        } => {
            let reports =
                distinct_values(source, table, &as_strs(columns), filter.as_deref(), options)
                    .await?;
            for report in &reports {
                output.display(report)?;
                if report.is_listing() {
                    output.export(report, &report.export_file_name())?;
                }
            }
        }
        Step::Compare {
            tables,
            columns,
            join_on,
            filter,
        } => {
            let report = compare_two_values(
                source,
                &as_strs(tables),
                &as_strs(columns),
                join_on.as_deref(),
                filter.as_deref(),
            )
            .await?;
            output.display(&report)?;
        }
        Step::DistinctStrings {
            table,
            columns,
            filter,
            options,
        } => {
            let report = identify_distinct_strings(
                source,
                table,
                &as_strs(columns),
                filter.as_deref(),
                options,
            )
            .await?;
            output.display(&report)?;
        }
        Step::Substrings {
            table,
            columns,
            substrings,
            filter,
            merge_all,
        } => {
            let report = count_substrings(
                source,
                table,
                &as_strs(columns),
                &as_strs(substrings),
                filter.as_deref(),
                *merge_all,
            )
            .await?;
            output.display(&report)?;
        }
        Step::MultipleRecords {
            table,
            fields,
            combinations,
            key_field,
            filter,
        } => {
            let pairs: Vec<(&str, &str)> = combinations
                .iter()
                .map(|(a, b)| (a.as_str(), b.as_str()))
                .collect();
            let report = multiple_records(
                source,
                table,
                &as_strs(fields),
                &pairs,
                key_field,
                filter.as_deref(),
            )
            .await?;
            output.display(&report)?;
        }
        Step::ProblemDates {
            table,
            columns,
            filter,
            options,
        } => {
            let report =
                problem_dates(source, table, &as_strs(columns), filter.as_deref(), options)
                    .await?;
            output.display(&report)?;
        }
    }
    Ok(())
}

/// Runs every section in order, writing headings and reports.
///
/// Steps run one at a time; the first failing step stops the notebook.
///
/// # Errors
/// Returns the first query, output or export error.
pub async fn run_notebook<W: Write>(
    source: &dyn DataSource,
    sections: &[Section],
    output: &mut NotebookOutput<W>,
) -> Result<()> {
    output.prepare().await?;
    output.display(&format!(
        "This notebook was run on {}.\n",
        chrono::Local::now().format("%Y-%m-%d")
    ))?;

    for section in sections {
        tracing::info!("Running section '{}' ({} steps)", section.title, section.steps.len());
        output.heading(section.level, &section.title)?;
        for step in &section.steps {
            run_step(source, step, output).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_filter() {
        assert_eq!(
            and_filter(None, "CAST(Received AS DATE) >'2023-06-28'"),
            "CAST(Received AS DATE) >'2023-06-28'"
        );
        assert_eq!(
            and_filter(Some(NON_HOSPITALISED), "Intervention='Sotrovimab'"),
            "COVID_indication='non_hospitalised' AND Intervention='Sotrovimab'"
        );
    }

    #[test]
    fn test_all_patients_notebook() {
        let sections = therapeutics_description("Therapeutics", Variant::AllPatients);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert!(titles.contains(&"Distinct risk groups"));
        assert!(titles.contains(&"Symptom onset dates and At-Risk groups"));

        let Some(Step::Schema { options, .. }) = sections[1].steps.first() else {
            panic!("expected the schema step first");
        };
        assert_eq!(options.filters.len(), 2);

        // two columns, two cut-offs, two filters
        let range = sections
            .iter()
            .find(|s| s.title == "Past and future dates")
            .unwrap();
        assert_eq!(range.steps.len(), 8);
    }

    #[test]
    fn test_inpatient_notebook() {
        let sections = therapeutics_description("Therapeutics", Variant::Inpatients);
        assert!(sections.iter().all(|s| s.title != "Distinct risk groups"));

        let patients = sections
            .iter()
            .find(|s| s.title == "Patients with multiple records")
            .unwrap();
        assert_eq!(patients.steps.len(), 1);
        let Step::DistinctValues {
            filter, options, ..
        } = &patients.steps[0]
        else {
            panic!("expected a distinct-values step");
        };
        assert_eq!(filter.as_deref(), Some(HOSPITALISED));
        assert!(options.frequency_count);
    }
}
