//! In-memory workbook model

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use zip::ZipArchive;

use crate::address::CellRef;
use crate::error::{ProcessError, Result};

/// Zip archive over the uploaded bytes; cloning it is cheap
pub type PackageArchive = ZipArchive<Cursor<Arc<[u8]>>>;

/// A sheet listed in the workbook part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    /// Zip entry holding the sheet XML (e.g. `xl/worksheets/sheet2.xml`)
    pub part: String,
}

/// Represents a loaded workbook plus the formula writes queued against it
///
/// Parts are never decoded up front: the original archive is kept and only the
/// worksheets with queued writes are re-streamed when the workbook is written.
#[derive(Debug, Clone)]
pub struct Workbook {
    pub(crate) archive: PackageArchive,
    pub(crate) workbook_part: String,
    pub(crate) sheets: Vec<SheetEntry>,
    /// part -> cell -> formula text (with leading `=`)
    pub(crate) edits: BTreeMap<String, BTreeMap<CellRef, String>>,
}

impl Workbook {
    /// Get all sheet names, in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheets(&self) -> &[SheetEntry] {
        &self.sheets
    }

    pub fn contains_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    /// Get a sheet by name
    pub fn sheet(&self, name: &str) -> Result<&SheetEntry> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ProcessError::SheetNotFound(name.to_string()))
    }

    /// Path of the workbook part inside the package
    pub fn workbook_part(&self) -> &str {
        &self.workbook_part
    }

    /// Queue a formula write; the last write to a cell wins
    pub fn set_formula(&mut self, sheet: &str, cell: &str, formula: &str) -> Result<()> {
        let cell_ref: CellRef = cell.parse()?;
        let part = self.sheet(sheet)?.part.clone();
        self.edits
            .entry(part)
            .or_default()
            .insert(cell_ref, formula.to_string());
        Ok(())
    }

    /// Formula queued for a cell, if any
    pub fn pending_formula(&self, sheet: &str, cell: &str) -> Option<&str> {
        let cell_ref = CellRef::from_a1(cell)?;
        let part = &self.sheet(sheet).ok()?.part;
        self.edits.get(part)?.get(&cell_ref).map(String::as_str)
    }

    pub fn has_edits(&self) -> bool {
        self.edits.values().any(|cells| !cells.is_empty())
    }

    /// Number of queued cell writes
    pub fn edit_count(&self) -> usize {
        self.edits.values().map(BTreeMap::len).sum()
    }
}
