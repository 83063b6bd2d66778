//! Streaming formula patcher for worksheet XML
//!
//! Events are copied through unchanged except for the targeted `<c>` elements,
//! the `<row>` elements that hold them, the `<dimension>` bounds, and the
//! dependents of shared formulas whose anchor is overwritten.

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use tracing::debug;

use super::shared::{SharedAnchor, SharedFormulaAttrs, orphaned_shared_groups};
use super::{element_prefix, local_name, prefixed_tag, write};
use crate::address::CellRef;
use crate::error::{ProcessError, Result};

#[derive(Debug, Clone)]
struct PendingCell {
    cell: CellRef,
    /// Formula as stored in `<f>`, without the leading `=`
    formula: String,
}

struct RowState {
    pending: Vec<PendingCell>,
    next_idx: usize,
    cell_prefix: Option<String>,
}

/// Rewrite `edits` (cell -> formula with leading `=`) into one worksheet part
pub fn patch_worksheet_xml(
    xml: &[u8],
    part: &str,
    edits: &BTreeMap<CellRef, String>,
) -> Result<Vec<u8>> {
    let mut rows: BTreeMap<u32, Vec<PendingCell>> = BTreeMap::new();
    for (cell, formula) in edits {
        rows.entry(cell.row).or_default().push(PendingCell {
            cell: *cell,
            formula: formula.strip_prefix('=').unwrap_or(formula).to_string(),
        });
    }
    let bounds = patch_bounds(edits);
    let orphaned = orphaned_shared_groups(xml, part, edits)?;
    if !orphaned.is_empty() {
        debug!(part, groups = orphaned.len(), "detaching shared formulas from overwritten anchors");
    }

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));

    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;
    let mut sheet_prefix: Option<String> = None;
    let mut last_row: Option<u32> = None;
    let mut last_col: Option<u32> = None;
    let mut row_state: Option<RowState> = None;
    let mut current_cell: Option<CellRef> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ProcessError::xml(part, e))?;
        match event {
            Event::Eof => break,

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                in_sheet_data = true;
                sheet_prefix = owned_prefix(e);
                write(&mut writer, part, Event::Start(e.borrow()))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if rows.is_empty() {
                    write(&mut writer, part, Event::Empty(e.borrow()))?;
                } else {
                    // Expand `<sheetData/>` into `<sheetData>...</sheetData>`
                    sheet_prefix = owned_prefix(e);
                    let tag = tag_name(e);
                    write(&mut writer, part, Event::Start(e.borrow()))?;
                    write_rows_before(&mut writer, part, &mut rows, None, sheet_prefix.as_deref())?;
                    write(&mut writer, part, Event::End(BytesEnd::new(tag.as_str())))?;
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_rows_before(&mut writer, part, &mut rows, None, sheet_prefix.as_deref())?;
                in_sheet_data = false;
                write(&mut writer, part, Event::End(e.borrow()))?;
            }

            Event::Start(ref e) | Event::Empty(ref e)
                if !in_sheet_data && local_name(e.name().as_ref()) == b"dimension" =>
            {
                let updated = match bounds {
                    Some(bounds) => updated_dimension(e, bounds, part)?,
                    None => e.to_owned(),
                };
                if matches!(event, Event::Start(_)) {
                    write(&mut writer, part, Event::Start(updated))?;
                } else {
                    write(&mut writer, part, Event::Empty(updated))?;
                }
            }

            Event::Start(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row = row_index(e, last_row, part)?;
                last_row = Some(row);
                last_col = None;
                current_cell = None;
                write_rows_before(&mut writer, part, &mut rows, Some(row), sheet_prefix.as_deref())?;

                match rows.remove(&row) {
                    Some(pending) => {
                        write(&mut writer, part, Event::Start(updated_row_spans(e, &pending, part)?))?;
                        row_state = Some(RowState {
                            pending,
                            next_idx: 0,
                            cell_prefix: None,
                        });
                    }
                    None => write(&mut writer, part, Event::Start(e.borrow()))?,
                }
            }
            Event::Empty(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row = row_index(e, last_row, part)?;
                last_row = Some(row);
                last_col = None;
                current_cell = None;
                write_rows_before(&mut writer, part, &mut rows, Some(row), sheet_prefix.as_deref())?;

                match rows.remove(&row) {
                    Some(pending) => {
                        // Expand `<row/>` into `<row>...</row>`
                        let tag = tag_name(e);
                        let prefix = owned_prefix(e).or_else(|| sheet_prefix.clone());
                        write(&mut writer, part, Event::Start(updated_row_spans(e, &pending, part)?))?;
                        for cell in &pending {
                            write_formula_cell(&mut writer, part, None, cell, prefix.as_deref())?;
                        }
                        write(&mut writer, part, Event::End(BytesEnd::new(tag.as_str())))?;
                    }
                    None => write(&mut writer, part, Event::Empty(e.borrow()))?,
                }
            }
            Event::End(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                if let Some(mut state) = row_state.take() {
                    let prefix = state.cell_prefix.clone().or_else(|| sheet_prefix.clone());
                    write_pending_cells(&mut writer, part, &mut state, None, prefix.as_deref())?;
                }
                current_cell = None;
                write(&mut writer, part, Event::End(e.borrow()))?;
            }

            Event::Start(ref e) | Event::Empty(ref e)
                if in_sheet_data && current_cell.is_none() && local_name(e.name().as_ref()) == b"c" =>
            {
                let is_empty = matches!(event, Event::Empty(_));
                let col = cell_column(e, last_col, part)?;
                last_col = Some(col);
                let prefix = owned_prefix(e).or_else(|| sheet_prefix.clone());

                let target = match row_state.as_mut() {
                    Some(state) => {
                        if state.cell_prefix.is_none() {
                            state.cell_prefix = owned_prefix(e);
                        }
                        write_pending_cells(&mut writer, part, state, Some(col), prefix.as_deref())?;
                        let target = state
                            .pending
                            .get(state.next_idx)
                            .filter(|p| p.cell.col == col)
                            .cloned();
                        if target.is_some() {
                            state.next_idx += 1;
                        }
                        target
                    }
                    None => None,
                };
                match target {
                    Some(pending) => {
                        if !is_empty {
                            skip_element(&mut reader, e, part)?;
                        }
                        write_formula_cell(&mut writer, part, Some(e), &pending, prefix.as_deref())?;
                    }
                    None if is_empty => write(&mut writer, part, Event::Empty(e.borrow()))?,
                    None => {
                        current_cell = Some(CellRef::new(last_row.unwrap_or(0), col));
                        write(&mut writer, part, Event::Start(e.borrow()))?;
                    }
                }
            }
            Event::End(ref e) if current_cell.is_some() && local_name(e.name().as_ref()) == b"c" => {
                current_cell = None;
                write(&mut writer, part, Event::End(e.borrow()))?;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if !orphaned.is_empty() && current_cell.is_some() && local_name(e.name().as_ref()) == b"f" =>
            {
                let has_body = matches!(event, Event::Start(_));
                match (detached_formula(e, current_cell, &orphaned, part)?, has_body) {
                    (Some(formula), _) => {
                        if has_body {
                            skip_element(&mut reader, e, part)?;
                        }
                        write_detached_formula(&mut writer, part, e, &formula)?;
                    }
                    (None, true) => write(&mut writer, part, Event::Start(e.borrow()))?,
                    (None, false) => write(&mut writer, part, Event::Empty(e.borrow()))?,
                }
            }
            // Cells must precede any trailing row children such as extLst
            Event::Start(_) | Event::Empty(_) if row_state.is_some() && current_cell.is_none() => {
                if let Some(state) = row_state.as_mut() {
                    let prefix = state.cell_prefix.clone().or_else(|| sheet_prefix.clone());
                    write_pending_cells(&mut writer, part, state, None, prefix.as_deref())?;
                }
                write(&mut writer, part, event.borrow())?;
            }

            ev => write(&mut writer, part, ev)?,
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(ProcessError::Serialize(format!(
            "{part}: worksheet has no <sheetData>"
        )));
    }

    Ok(writer.into_inner())
}

/// Write every queued row whose index is below `before` (all rows when `None`)
fn write_rows_before<W: Write>(
    writer: &mut Writer<W>,
    part: &str,
    rows: &mut BTreeMap<u32, Vec<PendingCell>>,
    before: Option<u32>,
    prefix: Option<&str>,
) -> Result<()> {
    while let Some((&row, _)) = rows.first_key_value() {
        if before.is_some_and(|limit| row >= limit) {
            break;
        }
        let pending = rows.remove(&row).unwrap_or_default();

        let row_tag = prefixed_tag(prefix, "row");
        let row_number = (row + 1).to_string();
        let mut start = BytesStart::new(row_tag.as_str());
        start.push_attribute(("r", row_number.as_str()));
        write(writer, part, Event::Start(start))?;
        for cell in &pending {
            write_formula_cell(writer, part, None, cell, prefix)?;
        }
        write(writer, part, Event::End(BytesEnd::new(row_tag.as_str())))?;
    }
    Ok(())
}

/// Write queued cells of the current row whose column is below `before`
fn write_pending_cells<W: Write>(
    writer: &mut Writer<W>,
    part: &str,
    state: &mut RowState,
    before: Option<u32>,
    prefix: Option<&str>,
) -> Result<()> {
    while let Some(pending) = state.pending.get(state.next_idx) {
        if before.is_some_and(|limit| pending.cell.col >= limit) {
            break;
        }
        write_formula_cell(writer, part, None, pending, prefix)?;
        state.next_idx += 1;
    }
    Ok(())
}

/// Emit `<c r=".."><f>..</f></c>`, keeping the original cell's style and other attributes
fn write_formula_cell<W: Write>(
    writer: &mut Writer<W>,
    part: &str,
    original: Option<&BytesStart<'_>>,
    pending: &PendingCell,
    prefix: Option<&str>,
) -> Result<()> {
    let cell_tag = match original {
        Some(orig) => tag_name(orig),
        None => prefixed_tag(prefix, "c"),
    };
    let f_tag = prefixed_tag(prefix, "f");
    let a1 = pending.cell.to_a1();

    let mut c = BytesStart::new(cell_tag.as_str());
    c.push_attribute(("r", a1.as_str()));
    if let Some(orig) = original {
        for attr in orig.attributes() {
            let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
            // Type and value/cell metadata describe the cached value being dropped
            if matches!(attr.key.as_ref(), b"r" | b"t" | b"vm" | b"cm") {
                continue;
            }
            c.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }

    write(writer, part, Event::Start(c))?;
    write(writer, part, Event::Start(BytesStart::new(f_tag.as_str())))?;
    write(
        writer,
        part,
        Event::Text(BytesText::from_escaped(partial_escape(&pending.formula))),
    )?;
    write(writer, part, Event::End(BytesEnd::new(f_tag.as_str())))?;
    write(writer, part, Event::End(BytesEnd::new(cell_tag.as_str())))?;
    Ok(())
}

/// Consume the children of `start` up to its end tag
fn skip_element(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>, part: &str) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf).map_err(|e| ProcessError::xml(part, e))? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(ProcessError::Serialize(format!(
                    "{part}: unterminated element {}",
                    String::from_utf8_lossy(start.name().as_ref())
                )));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Shifted formula for a dependent of a group whose anchor is overwritten
fn detached_formula(
    f: &BytesStart<'_>,
    cell: Option<CellRef>,
    orphaned: &HashMap<String, SharedAnchor>,
    part: &str,
) -> Result<Option<String>> {
    let Some(cell) = cell else {
        return Ok(None);
    };
    let Some(attrs) = SharedFormulaAttrs::of(f, part)? else {
        return Ok(None);
    };
    if attrs.has_ref {
        return Ok(None);
    }
    Ok(attrs
        .si
        .as_ref()
        .and_then(|si| orphaned.get(si))
        .map(|anchor| anchor.formula_at(cell)))
}

/// `<f>` with the shared attributes dropped and its own formula text
fn write_detached_formula<W: Write>(
    writer: &mut Writer<W>,
    part: &str,
    original: &BytesStart<'_>,
    formula: &str,
) -> Result<()> {
    let tag = tag_name(original);
    let mut f = BytesStart::new(tag.as_str());
    for attr in original.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if matches!(attr.key.as_ref(), b"t" | b"si" | b"ref") {
            continue;
        }
        f.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    write(writer, part, Event::Start(f))?;
    write(writer, part, Event::Text(BytesText::from_escaped(partial_escape(formula))))?;
    write(writer, part, Event::End(BytesEnd::new(tag.as_str())))
}

/// 0-based row index from `r`, or the row after the previous one
fn row_index(e: &BytesStart<'_>, last_row: Option<u32>, part: &str) -> Result<u32> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() == b"r" {
            let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
            return value
                .parse::<u32>()
                .ok()
                .and_then(|r| r.checked_sub(1))
                .ok_or_else(|| {
                    ProcessError::CorruptWorkbook(format!("{part}: invalid row number '{value}'"))
                });
        }
    }
    Ok(last_row.map_or(0, |r| r + 1))
}

/// 0-based column index from `r`, or the column after the previous cell
fn cell_column(e: &BytesStart<'_>, last_col: Option<u32>, part: &str) -> Result<u32> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() == b"r" {
            let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
            return CellRef::from_a1(&value)
                .map(|cell| cell.col)
                .ok_or_else(|| {
                    ProcessError::CorruptWorkbook(format!("{part}: invalid cell reference '{value}'"))
                });
        }
    }
    Ok(last_col.map_or(0, |c| c + 1))
}

/// (min_row, min_col, max_row, max_col), 0-based
type Bounds = (u32, u32, u32, u32);

fn patch_bounds(edits: &BTreeMap<CellRef, String>) -> Option<Bounds> {
    edits.keys().fold(None, |acc, cell| {
        Some(match acc {
            None => (cell.row, cell.col, cell.row, cell.col),
            Some((r0, c0, r1, c1)) => (r0.min(cell.row), c0.min(cell.col), r1.max(cell.row), c1.max(cell.col)),
        })
    })
}

fn parse_dimension(dimension: &str) -> Option<Bounds> {
    let (start, end) = dimension.split_once(':').unwrap_or((dimension, dimension));
    let start = CellRef::from_a1(&start.replace('$', ""))?;
    let end = CellRef::from_a1(&end.replace('$', ""))?;
    Some((start.row, start.col, end.row, end.col))
}

fn updated_dimension(e: &BytesStart<'_>, patch: Bounds, part: &str) -> Result<BytesStart<'static>> {
    let tag = tag_name(e);
    let mut out = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() != b"ref" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            continue;
        }

        let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
        let merged = match parse_dimension(&value) {
            Some((r0, c0, r1, c1)) => (r0.min(patch.0), c0.min(patch.1), r1.max(patch.2), c1.max(patch.3)),
            None => patch,
        };
        let start = CellRef::new(merged.0, merged.1);
        let end = CellRef::new(merged.2, merged.3);
        let range = if start == end {
            start.to_a1()
        } else {
            format!("{start}:{end}")
        };
        out.push_attribute(("ref", range.as_str()));
    }
    Ok(out)
}

/// Widen a row's `spans` hint so it covers the inserted cells
fn updated_row_spans(
    e: &BytesStart<'_>,
    pending: &[PendingCell],
    part: &str,
) -> Result<BytesStart<'static>> {
    let min_col = pending.iter().map(|p| p.cell.col + 1).min().unwrap_or(1);
    let max_col = pending.iter().map(|p| p.cell.col + 1).max().unwrap_or(1);

    let tag = tag_name(e);
    let mut out = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() != b"spans" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            continue;
        }

        let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
        let spans = value
            .split_once(':')
            .and_then(|(lo, hi)| Some((lo.parse::<u32>().ok()?, hi.parse::<u32>().ok()?)));
        // Multi-range or malformed hints are dropped; the attribute is optional
        if let Some((lo, hi)) = spans {
            let widened = format!("{}:{}", lo.min(min_col), hi.max(max_col));
            out.push_attribute(("spans", widened.as_str()));
        }
    }
    Ok(out)
}

fn owned_prefix(e: &BytesStart<'_>) -> Option<String> {
    element_prefix(e.name().as_ref())
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}
