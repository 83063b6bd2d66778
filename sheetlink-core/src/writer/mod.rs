//! XLSX workbook serialization
//!
//! The original package is re-zipped entry by entry. Worksheets with queued
//! formula writes are re-streamed; everything else is copied raw.

use quick_xml::Writer;
use quick_xml::events::Event;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ProcessError, Result};
use crate::reader::package::{self, read_part};
use crate::reader::{PackageArchive, Workbook};

pub mod recalc;
mod shared;
pub mod worksheet;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// How the written package signals that cached values are stale
///
/// Both hints only apply when at least one formula was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Set `fullCalcOnLoad="1"` on the workbook's `<calcPr>`
    pub force_full_calc: bool,
    /// Drop `xl/calcChain.xml` together with its relationship and content type
    pub drop_calc_chain: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            force_full_calc: true,
            drop_calc_chain: true,
        }
    }
}

/// Serialize a workbook, applying its queued formula writes
pub fn write_workbook(workbook: &Workbook, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut archive = workbook.archive.clone();
    let has_edits = workbook.has_edits();
    let workbook_part = workbook.workbook_part.as_str();
    let rels_part = package::rels_part_for(workbook_part);

    let calc_chain_part = if has_edits && options.drop_calc_chain {
        find_calc_chain_part(&mut archive, workbook_part, &rels_part)?
    } else {
        None
    };
    let force_full_calc = has_edits && options.force_full_calc;

    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut unseen: BTreeSet<&str> = workbook
        .edits
        .iter()
        .filter(|(_, cells)| !cells.is_empty())
        .map(|(part, _)| part.as_str())
        .collect();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_read_error)?;
        let name = file.name().to_string();

        if calc_chain_part.as_deref() == Some(name.as_str()) {
            debug!(part = %name, "dropping calc chain");
            continue;
        }

        let patched = if let Some(cells) = workbook.edits.get(&name).filter(|c| !c.is_empty()) {
            unseen.remove(name.as_str());
            let xml = read_entry(&mut file, &name)?;
            debug!(part = %name, cells = cells.len(), "patching worksheet");
            Some(worksheet::patch_worksheet_xml(&xml, &name, cells)?)
        } else if force_full_calc && name == workbook_part {
            let xml = read_entry(&mut file, &name)?;
            Some(recalc::force_full_calc_on_load(&xml, &name)?)
        } else if let Some(calc_chain) = calc_chain_part.as_deref() {
            if name == rels_part {
                let xml = read_entry(&mut file, &name)?;
                Some(recalc::remove_calc_chain_relationship(&xml, &name)?)
            } else if name == CONTENT_TYPES_PART {
                let xml = read_entry(&mut file, &name)?;
                Some(recalc::remove_calc_chain_content_type(&xml, &name, calc_chain)?)
            } else {
                None
            }
        } else {
            None
        };

        match patched {
            Some(bytes) => {
                zip.start_file(name.as_str(), file_options).map_err(zip_write_error)?;
                zip.write_all(&bytes)
                    .map_err(|e| ProcessError::Serialize(format!("{name}: {e}")))?;
            }
            None => zip.raw_copy_file(file).map_err(zip_write_error)?,
        }
    }

    if let Some(missing) = unseen.into_iter().next() {
        return Err(ProcessError::Serialize(format!(
            "worksheet part {missing} is missing from the package"
        )));
    }

    let bytes = zip.finish().map_err(zip_write_error)?.into_inner();
    info!(
        cells = workbook.edit_count(),
        bytes = bytes.len(),
        "workbook serialized"
    );
    Ok(bytes)
}

impl Workbook {
    /// Serialize into `.xlsx` bytes
    pub fn to_bytes(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        write_workbook(self, options)
    }
}

/// Calc chain part named by the workbook relationships, if present in the package
fn find_calc_chain_part(
    archive: &mut PackageArchive,
    workbook_part: &str,
    rels_part: &str,
) -> Result<Option<String>> {
    if archive.index_for_name(rels_part).is_none() {
        return Ok(None);
    }

    let rels_xml = read_part(archive, rels_part)?;
    let rels = package::parse_relationships(&rels_xml, rels_part)?;
    Ok(recalc::calc_chain_target(&rels)
        .map(|target| package::resolve_target(workbook_part, target))
        .filter(|part| archive.index_for_name(part).is_some()))
}

fn read_entry(file: &mut impl Read, name: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| ProcessError::CorruptWorkbook(format!("{name}: {e}")))?;
    Ok(buf)
}

fn zip_read_error(e: zip::result::ZipError) -> ProcessError {
    ProcessError::CorruptWorkbook(e.to_string())
}

fn zip_write_error(e: zip::result::ZipError) -> ProcessError {
    ProcessError::Serialize(e.to_string())
}

pub(crate) fn write<W: Write>(writer: &mut Writer<W>, part: &str, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ProcessError::Serialize(format!("{part}: {e}")))
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

pub(crate) fn element_prefix(name: &[u8]) -> Option<String> {
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

pub(crate) fn prefixed_tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::all_forms;
    use zip::ZipArchive;

    fn entry_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_calc_chain_dropped_only_with_edits() {
        let bytes = all_forms().calc_chain().build();
        let mut workbook = Workbook::from_bytes(bytes.clone()).unwrap();

        let untouched = workbook.to_bytes(&WriteOptions::default()).unwrap();
        assert!(entry_names(&untouched).iter().any(|n| n == "xl/calcChain.xml"));

        workbook.set_formula("Форма 2", "F21", "='Форма 4'!L13").unwrap();
        let linked = workbook.to_bytes(&WriteOptions::default()).unwrap();
        let names = entry_names(&linked);
        assert!(!names.iter().any(|n| n == "xl/calcChain.xml"));
        assert_eq!(names.len(), entry_names(&bytes).len() - 1);
    }

    #[test]
    fn test_untouched_entries_keep_compressed_bytes() {
        let bytes = all_forms().build();
        let mut workbook = Workbook::from_bytes(bytes.clone()).unwrap();
        workbook.set_formula("Форма 2", "F21", "='Форма 4'!L13").unwrap();
        let linked = workbook.to_bytes(&WriteOptions::default()).unwrap();

        let mut before = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut after = ZipArchive::new(Cursor::new(linked.as_slice())).unwrap();
        for name in ["xl/worksheets/sheet1.xml", "xl/_rels/workbook.xml.rels", "_rels/.rels"] {
            let a = before.by_name(name).unwrap().compressed_size();
            let b = after.by_name(name).unwrap().compressed_size();
            assert_eq!(a, b, "{name}");
        }
        let patched = after.by_name("xl/worksheets/sheet2.xml").unwrap();
        assert_eq!(patched.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(local_name(b"x:row"), b"row");
        assert_eq!(local_name(b"row"), b"row");
        assert_eq!(element_prefix(b"x:row").as_deref(), Some("x"));
        assert_eq!(element_prefix(b"row"), None);
        assert_eq!(prefixed_tag(Some("x"), "c"), "x:c");
        assert_eq!(prefixed_tag(None, "c"), "c");
    }

    #[test]
    fn test_default_options_enable_recalc_hints() {
        let options = WriteOptions::default();
        assert!(options.force_full_calc);
        assert!(options.drop_calc_chain);
    }
}
