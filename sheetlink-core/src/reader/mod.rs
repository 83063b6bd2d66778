//! XLSX workbook loading

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{ProcessError, Result};

pub mod cells;
pub mod package;
pub mod workbook;

pub use cells::{Cell, CellReader, CellValue, SheetCells, read_sheet_cells};
pub use workbook::{PackageArchive, SheetEntry, Workbook};

/// Read a workbook from the raw bytes of an `.xlsx` upload
pub fn read_workbook(bytes: impl Into<Arc<[u8]>>) -> Result<Workbook> {
    let bytes: Arc<[u8]> = bytes.into();
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProcessError::CorruptWorkbook(e.to_string()))?;

    let workbook_part = package::find_workbook_part(&mut archive)?;
    let workbook_xml = package::read_part(&mut archive, &workbook_part)?;
    let sheet_list = package::parse_sheet_list(&workbook_xml, &workbook_part)?;

    let rels_part = package::rels_part_for(&workbook_part);
    let rels = if sheet_list.is_empty() {
        Vec::new()
    } else {
        let rels_xml = package::read_part(&mut archive, &rels_part)?;
        package::parse_relationships(&rels_xml, &rels_part)?
    };

    let mut sheets = Vec::with_capacity(sheet_list.len());
    for (name, rel_id) in sheet_list {
        let rel = rels.iter().find(|r| r.id == rel_id).ok_or_else(|| {
            ProcessError::CorruptWorkbook(format!(
                "{rels_part}: no relationship {rel_id} for sheet '{name}'"
            ))
        })?;

        let part = package::resolve_target(&workbook_part, &rel.target);
        if archive.index_for_name(&part).is_none() {
            return Err(ProcessError::CorruptWorkbook(format!(
                "sheet '{name}' points to missing part {part}"
            )));
        }

        sheets.push(SheetEntry { name, part });
    }

    debug!(
        workbook_part = %workbook_part,
        sheets = sheets.len(),
        entries = archive.len(),
        "loaded workbook package"
    );

    Ok(Workbook {
        archive,
        workbook_part,
        sheets,
        edits: BTreeMap::new(),
    })
}

impl Workbook {
    /// Parse an `.xlsx` container held in memory
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        read_workbook(bytes)
    }
}
