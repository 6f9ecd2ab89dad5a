//! Notebook output: Markdown to a writer, optional CSV exports.
//!
//! Reports render themselves as Markdown through `Display`; tables that
//! the notebooks export are additionally written as CSV files when an
//! output directory is configured.

use sdc_core::{Result, SdcError, Tabular, write_csv};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Destination of one notebook run.
pub struct NotebookOutput<W: Write> {
    writer: W,
    export_dir: Option<PathBuf>,
    exported: Vec<PathBuf>,
}

impl<W: Write> NotebookOutput<W> {
    /// Writes Markdown to `writer` and, when `export_dir` is set, CSV files
    /// into it.
    pub fn new(writer: W, export_dir: Option<PathBuf>) -> Self {
        Self {
            writer,
            export_dir,
            exported: Vec::new(),
        }
    }

    /// Creates the export directory if one is configured.
    ///
    /// # Errors
    /// Returns an I/O error if the directory cannot be created.
    pub async fn prepare(&self) -> Result<()> {
        if let Some(dir) = &self.export_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SdcError::io(format!("Failed to create {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Writes a Markdown heading.
    ///
    /// # Errors
    /// Returns an I/O error if the writer fails.
    pub fn heading(&mut self, level: usize, text: &str) -> Result<()> {
        writeln!(self.writer, "{} {}\n", "#".repeat(level.max(1)), text)
            .map_err(|e| SdcError::io("Failed to write notebook output", e))
    }

    /// Writes a paragraph or a rendered report.
    ///
    /// # Errors
    /// Returns an I/O error if the writer fails.
    pub fn display(&mut self, item: &dyn fmt::Display) -> Result<()> {
        writeln!(self.writer, "{}", item)
            .map_err(|e| SdcError::io("Failed to write notebook output", e))
    }

    /// Writes `table` to `<export_dir>/<file_name>`; does nothing without an
    /// export directory.
    ///
    /// # Errors
    /// Returns an export error if the CSV file cannot be written.
    pub fn export(&mut self, table: &dyn Tabular, file_name: &str) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.export_dir else {
            return Ok(None);
        };

        let path = dir.join(file_name);
        write_csv(table, &path)?;
        tracing::info!("Exported {}", path.display());
        self.exported.push(path.clone());
        Ok(Some(path))
    }

    /// Files exported so far.
    pub fn exported(&self) -> &[PathBuf] {
        &self.exported
    }

    /// Export directory, if any.
    pub fn export_dir(&self) -> Option<&Path> {
        self.export_dir.as_deref()
    }

    /// Flushes and returns the writer.
    ///
    /// # Errors
    /// Returns an I/O error if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .flush()
            .map_err(|e| SdcError::io("Failed to flush notebook output", e))?;
        Ok(self.writer)
    }
}
