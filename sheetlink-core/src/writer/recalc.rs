//! Recalculation hints applied when formulas change
//!
//! New formula cells carry no cached value, so the calc chain is dropped and the
//! workbook is flagged for a full recalculation on open.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{element_prefix, local_name, prefixed_tag, write};
use crate::error::{ProcessError, Result};
use crate::reader::package::Relationship;

const CALC_CHAIN_REL: &str = "/calcChain";

// Children of <workbook> that follow <calcPr> in schema order
const AFTER_CALC_PR: [&[u8]; 9] = [
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, inserting the element if needed
pub fn force_full_calc_on_load(xml: &[u8], part: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut prefix: Option<String> = None;
    let mut done = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| ProcessError::xml(part, e))?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if depth == 0 => {
                prefix = element_prefix(e.name().as_ref());
                depth += 1;
                write(&mut writer, part, Event::Start(e.borrow()))?;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if depth == 1 && !done && local_name(e.name().as_ref()) == b"calcPr" =>
            {
                let updated = with_full_calc(e, part)?;
                done = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                    write(&mut writer, part, Event::Start(updated))?;
                } else {
                    write(&mut writer, part, Event::Empty(updated))?;
                }
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if depth == 1 && !done && AFTER_CALC_PR.contains(&local_name(e.name().as_ref())) =>
            {
                write_calc_pr(&mut writer, part, prefix.as_deref())?;
                done = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
                write(&mut writer, part, event.borrow())?;
            }
            Event::Start(_) => {
                depth += 1;
                write(&mut writer, part, event)?;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !done {
                    write_calc_pr(&mut writer, part, prefix.as_deref())?;
                    done = true;
                }
                write(&mut writer, part, event)?;
            }
            ev => write(&mut writer, part, ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Find the calc chain relationship target in the workbook relationships
pub fn calc_chain_target(rels: &[Relationship]) -> Option<&str> {
    rels.iter()
        .find(|rel| rel.rel_type.ends_with(CALC_CHAIN_REL) && !rel.external)
        .map(|rel| rel.target.as_str())
}

/// Drop the calc chain relationship from the workbook relationships
pub fn remove_calc_chain_relationship(xml: &[u8], part: &str) -> Result<Vec<u8>> {
    filter_empty_elements(xml, part, b"Relationship", |e| {
        Ok(attribute(e, b"Type", part)?.is_some_and(|t| t.ends_with(CALC_CHAIN_REL)))
    })
}

/// Drop the content type override of the calc chain part
pub fn remove_calc_chain_content_type(xml: &[u8], part: &str, calc_chain_part: &str) -> Result<Vec<u8>> {
    let part_name = format!("/{calc_chain_part}");
    filter_empty_elements(xml, part, b"Override", |e| {
        Ok(attribute(e, b"PartName", part)?.is_some_and(|p| p == part_name))
    })
}

fn filter_empty_elements(
    xml: &[u8],
    part: &str,
    element: &[u8],
    should_skip: impl Fn(&BytesStart<'_>) -> Result<bool>,
) -> Result<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| ProcessError::xml(part, e))? {
            Event::Empty(e) if local_name(e.name().as_ref()) == element => {
                if !should_skip(&e)? {
                    write(&mut writer, part, Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => write(&mut writer, part, e)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn with_full_calc(e: &BytesStart<'_>, part: &str) -> Result<BytesStart<'static>> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() != b"fullCalcOnLoad" {
            out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    out.push_attribute(("fullCalcOnLoad", "1"));
    Ok(out)
}

fn write_calc_pr(writer: &mut Writer<Vec<u8>>, part: &str, prefix: Option<&str>) -> Result<()> {
    let mut calc_pr = BytesStart::new(prefixed_tag(prefix, "calcPr"));
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    write(writer, part, Event::Empty(calc_pr))
}

fn attribute(e: &BytesStart<'_>, key: &[u8], part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|e| ProcessError::xml(part, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
