//! End-to-end processing of one uploaded workbook

use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::error::{ProcessError, Result};
use crate::forms::{REQUIRED_SHEETS, REWRITE_PHASES};
use crate::reader::{CellReader, CellValue, Workbook};
use crate::rewrite::apply_rewrites;
use crate::validate::check_required_sheets;
use crate::writer::{WriteOptions, write_workbook};

/// MIME type of the produced workbook
pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A processed workbook ready to be handed back to the caller
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// What a rewrite would do to one cell, for previews
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub sheet: String,
    pub cell: String,
    pub current_formula: Option<String>,
    pub current_value: CellValue,
    pub new_formula: String,
}

/// Reject filenames that do not end with `extension` (case-sensitive)
pub fn check_extension(filename: &str, extension: &str) -> Result<()> {
    if filename.ends_with(extension) {
        Ok(())
    } else {
        Err(ProcessError::InvalidFormat)
    }
}

/// Main processing interface
#[derive(Debug, Clone, Default)]
pub struct Processor {
    config: ProcessorConfig,
}

impl Processor {
    /// Create a processor with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor with custom configuration
    pub fn with_config(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Name given to the result of processing `filename`
    pub fn output_filename(&self, filename: &str) -> String {
        format!("{}{}", self.config.output_prefix, filename)
    }

    /// Gate, load, validate, rewrite and serialize one upload
    pub fn process(&self, filename: &str, bytes: impl Into<Vec<u8>>) -> Result<ProcessedFile> {
        check_extension(filename, &self.config.extension)?;

        let bytes: Vec<u8> = bytes.into();
        let input_len = bytes.len();
        let mut workbook = Workbook::from_bytes(bytes)?;
        check_required_sheets(&workbook, &REQUIRED_SHEETS)?;

        let written = apply_rewrites(&mut workbook, &REWRITE_PHASES)?;
        let options = WriteOptions::from(self.config.recalc);
        let output = write_workbook(&workbook, &options)?;

        info!(
            filename,
            input_bytes = input_len,
            output_bytes = output.len(),
            cells = written,
            "workbook processed"
        );

        Ok(ProcessedFile {
            filename: self.output_filename(filename),
            bytes: output,
            content_type: CONTENT_TYPE,
        })
    }

    /// Run the checks of [`Processor::process`] and report the cell changes it would make
    pub fn preview(&self, filename: &str, bytes: &[u8]) -> Result<Vec<CellChange>> {
        check_extension(filename, &self.config.extension)?;

        let workbook = Workbook::from_bytes(bytes.to_vec())?;
        check_required_sheets(&workbook, &REQUIRED_SHEETS)?;

        let mut reader = CellReader::open(bytes)?;
        let mut changes = Vec::new();
        for phase in &REWRITE_PHASES {
            for name in phase.sheets() {
                workbook.sheet(&name)?;
            }

            let cells = reader.sheet(phase.target_sheet)?;
            for rewrite in phase.rewrites {
                let current = cells.get(rewrite.cell);
                changes.push(CellChange {
                    sheet: phase.target_sheet.to_string(),
                    cell: rewrite.cell.to_string(),
                    current_formula: current.and_then(|c| c.formula.clone()),
                    current_value: current.map_or(CellValue::Empty, |c| c.value.clone()),
                    new_formula: rewrite.formula.to_string(),
                });
            }
        }

        debug!(filename, changes = changes.len(), "preview computed");
        Ok(changes)
    }
}
