//! CSV and Markdown rendering of report tables.
//!
//! Reports expose their rows as strings through [`Tabular`]; the strings
//! are the displayed forms (`<=7`, `1-7`, rounded counts), so nothing written
//! here can carry a raw count.

use crate::Result;
use crate::error::SdcError;
use std::io::Write;
use std::path::Path;

/// A report that can be laid out as a table of displayed values.
pub trait Tabular {
    /// Column headers.
    fn headers(&self) -> Vec<String>;

    /// Rows, each the same length as [`Tabular::headers`].
    fn records(&self) -> Vec<Vec<String>>;
}

/// Writes `table` as CSV to any writer.
///
/// # Errors
/// Returns an export error if a record cannot be written.
pub fn write_csv_to<W: Write>(table: &dyn Tabular, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(table.headers())
        .map_err(|e| SdcError::export("Failed to write CSV header", e))?;
    for record in table.records() {
        csv_writer
            .write_record(&record)
            .map_err(|e| SdcError::export("Failed to write CSV record", e))?;
    }

    csv_writer
        .flush()
        .map_err(|e| SdcError::io("Failed to flush CSV output", e))
}

/// Writes `table` as CSV to `path`, replacing any existing file.
///
/// # Errors
/// Returns an I/O error if the file cannot be created, or an export error
/// if a record cannot be written.
pub fn write_csv(table: &dyn Tabular, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| {
        SdcError::io(format!("Failed to create {}", path.display()), e)
    })?;
    write_csv_to(table, std::io::BufWriter::new(file))?;

    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Renders `table` as a GitHub-flavoured Markdown table.
///
/// A table without headers renders as an empty string.
pub fn render_markdown(table: &dyn Tabular) -> String {
    let headers = table.headers();
    if headers.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    push_markdown_row(&mut out, &headers);
    out.push('|');
    for _ in &headers {
        out.push_str(" --- |");
    }
    out.push('\n');
    for record in table.records() {
        push_markdown_row(&mut out, &record);
    }
    out
}

fn push_markdown_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&cell.replace('|', "\\|").replace('\n', " "));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Replaces characters that are awkward in file names.
pub(crate) fn file_name_fragment(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture;

    impl Tabular for Fixture {
        fn headers(&self) -> Vec<String> {
            vec!["Intervention".to_string(), "row_count".to_string()]
        }

        fn records(&self) -> Vec<Vec<String>> {
            vec![
                vec!["Sotrovimab".to_string(), "40".to_string()],
                vec!["Casirivimab and imdevimab".to_string(), "<=7".to_string()],
            ]
        }
    }

    #[test]
    fn test_write_csv_to_buffer() {
        let mut buffer = Vec::new();
        write_csv_to(&Fixture, &mut buffer).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "Intervention,row_count\nSotrovimab,40\nCasirivimab and imdevimab,<=7\n"
        );
    }

    #[test]
    fn test_write_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&Fixture, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Intervention,row_count\n"));
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&Fixture);
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "| Intervention | row_count |");
        assert_eq!(lines[1], "| --- | --- |");
        assert_eq!(lines[3], "| Casirivimab and imdevimab | <=7 |");
    }

    #[test]
    fn test_file_name_fragment() {
        assert_eq!(
            file_name_fragment("COVID_indication='non hospitalised'"),
            "COVID_indication='non_hospitalised'"
        );
        assert_eq!(file_name_fragment("a/b"), "a-b");
    }
}
