//! Shared formula groups that lose their anchor cell
//!
//! A shared group stores its formula text once, on the anchor cell
//! (`<f t="shared" ref=".." si="N">`); dependents carry only `<f t="shared" si="N"/>`.
//! When an anchor is overwritten, each surviving dependent is written out as
//! an ordinary formula shifted from the anchor's.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use super::local_name;
use crate::address::CellRef;
use crate::error::{ProcessError, Result};

static CELL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<sheet>(?:'(?:[^']|'')+'|[\p{L}\p{N}_.]+)!)?(?P<col_abs>\$?)(?P<col>[A-Z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)")
        .expect("valid regex")
});

/// Formula text and position of a shared group's anchor
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SharedAnchor {
    pub cell: CellRef,
    pub formula: String,
}

impl SharedAnchor {
    /// Formula of the dependent at `cell`, relative references shifted
    pub fn formula_at(&self, cell: CellRef) -> String {
        let row_shift = i64::from(cell.row) - i64::from(self.cell.row);
        let col_shift = i64::from(cell.col) - i64::from(self.cell.col);
        translate_shared_formula(&self.formula, row_shift, col_shift)
    }
}

/// Shared attributes of an `<f>` element
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SharedFormulaAttrs {
    pub si: Option<String>,
    pub has_ref: bool,
}

impl SharedFormulaAttrs {
    /// `None` unless the element is `t="shared"`
    pub fn of(f: &BytesStart<'_>, part: &str) -> Result<Option<Self>> {
        let mut shared = false;
        let mut attrs = SharedFormulaAttrs::default();
        for attr in f.attributes() {
            let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
            match attr.key.as_ref() {
                b"t" => shared = attr.value.as_ref() == b"shared",
                b"ref" => attrs.has_ref = true,
                b"si" => {
                    let si = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
                    attrs.si = Some(si.into_owned());
                }
                _ => {}
            }
        }
        Ok(shared.then_some(attrs))
    }
}

/// Shared groups of a worksheet whose anchor is among `edits`, keyed by `si`
pub(crate) fn orphaned_shared_groups(
    xml: &[u8],
    part: &str,
    edits: &BTreeMap<CellRef, String>,
) -> Result<HashMap<String, SharedAnchor>> {
    let mut groups = HashMap::new();
    if !contains(xml, b"shared") {
        return Ok(groups);
    }

    let mut reader = Reader::from_reader(xml);
    let mut row: Option<u32> = None;
    let mut col: Option<u32> = None;

    loop {
        let event = reader.read_event().map_err(|e| ProcessError::xml(part, e))?;
        let (e, has_body) = match event {
            Event::Eof => break,
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            _ => continue,
        };

        match local_name(e.name().as_ref()) {
            b"row" => {
                row = Some(match reference_attr(&e, part)? {
                    Some(r) => r.parse::<u32>().ok().and_then(|r| r.checked_sub(1)).ok_or_else(|| {
                        ProcessError::CorruptWorkbook(format!("{part}: invalid row number '{r}'"))
                    })?,
                    None => row.map_or(0, |r| r + 1),
                });
                col = None;
            }
            b"c" => {
                col = Some(match reference_attr(&e, part)? {
                    Some(a1) => CellRef::from_a1(&a1).map(|c| c.col).ok_or_else(|| {
                        ProcessError::CorruptWorkbook(format!("{part}: invalid cell reference '{a1}'"))
                    })?,
                    None => col.map_or(0, |c| c + 1),
                });
            }
            b"f" if has_body => {
                let Some(SharedFormulaAttrs { si: Some(si), has_ref: true }) =
                    SharedFormulaAttrs::of(&e, part)?
                else {
                    continue;
                };
                let (Some(row), Some(col)) = (row, col) else {
                    continue;
                };
                let cell = CellRef::new(row, col);
                if !edits.contains_key(&cell) || groups.contains_key(&si) {
                    continue;
                }
                let formula = read_formula_text(&mut reader, part)?;
                if !formula.is_empty() {
                    groups.insert(si, SharedAnchor { cell, formula });
                }
            }
            _ => {}
        }
    }

    Ok(groups)
}

fn read_formula_text(reader: &mut Reader<&[u8]>, part: &str) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(|e| ProcessError::xml(part, e))? {
            Event::Text(t) => {
                let t = t.unescape().map_err(|e| ProcessError::xml(part, e))?;
                text.push_str(&t);
            }
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(ProcessError::CorruptWorkbook(format!(
                    "{part}: unterminated shared formula"
                )));
            }
            _ => {}
        }
    }
}

fn reference_attr(e: &BytesStart<'_>, part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() == b"r" {
            let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Shift the relative A1 references of `formula`; `$`-anchored parts stay put
pub(crate) fn translate_shared_formula(formula: &str, row_shift: i64, col_shift: i64) -> String {
    // String literals are left alone: odd segments lie between quotes
    formula
        .split('"')
        .enumerate()
        .map(|(idx, segment)| {
            if idx % 2 == 1 {
                segment.to_string()
            } else {
                shift_references(segment, row_shift, col_shift)
            }
        })
        .collect::<Vec<_>>()
        .join("\"")
}

fn shift_references(segment: &str, row_shift: i64, col_shift: i64) -> String {
    CELL_REFERENCE
        .replace_all(segment, |caps: &Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            let end = start + whole.len();
            // Function names such as LOG10( and parts of longer identifiers are not references
            let before = segment[..start].chars().next_back();
            let after = segment[end..].chars().next();
            if before.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
                || after.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '(')
            {
                return whole.to_string();
            }

            let sheet = caps.name("sheet").map_or("", |m| m.as_str());
            let col_abs = !caps["col_abs"].is_empty();
            let row_abs = !caps["row_abs"].is_empty();
            let Some(cell) = CellRef::from_a1(&format!("{}{}", &caps["col"], &caps["row"])) else {
                return whole.to_string();
            };

            let row = if row_abs { cell.row } else { shifted(cell.row, row_shift) };
            let col = if col_abs { cell.col } else { shifted(cell.col, col_shift) };
            let shifted_cell = CellRef::new(row, col).to_a1();
            let split = shifted_cell
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(shifted_cell.len());
            let (letters, digits) = shifted_cell.split_at(split);

            format!(
                "{sheet}{}{letters}{}{digits}",
                if col_abs { "$" } else { "" },
                if row_abs { "$" } else { "" },
            )
        })
        .into_owned()
}

fn shifted(index: u32, shift: i64) -> u32 {
    u32::try_from((i64::from(index) + shift).max(0)).unwrap_or(u32::MAX)
}
