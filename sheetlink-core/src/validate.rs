//! Required-sheet presence check

use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::reader::Workbook;

/// Fail with every required sheet the workbook lacks, in `required` order
pub fn check_required_sheets(workbook: &Workbook, required: &[&str]) -> Result<()> {
    let missing = missing_sheets(&workbook.sheet_names(), required);
    if missing.is_empty() {
        debug!(required = required.len(), "all required sheets present");
        return Ok(());
    }

    Err(ProcessError::MissingSheets(missing))
}

/// `required - present`, keeping the order of `required`
pub fn missing_sheets(present: &[&str], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !present.contains(name))
        .map(|name| name.to_string())
        .collect()
}
