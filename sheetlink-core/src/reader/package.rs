//! OOXML package plumbing: relationships, part paths and the sheet list

use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Read, Seek};
use zip::ZipArchive;

use crate::error::{ProcessError, Result};

pub const ROOT_RELS_PART: &str = "_rels/.rels";
pub const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

/// One `<Relationship>` entry of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// Read a whole part out of the archive
pub fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| ProcessError::CorruptWorkbook(format!("{name}: {e}")))?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| ProcessError::CorruptWorkbook(format!("{name}: {e}")))?;
    Ok(buf)
}

/// Locate the workbook part through the package root relationships
pub fn find_workbook_part<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    if archive.index_for_name(ROOT_RELS_PART).is_none() {
        return Ok(DEFAULT_WORKBOOK_PART.to_string());
    }

    let rels_xml = read_part(archive, ROOT_RELS_PART)?;
    let rels = parse_relationships(&rels_xml, ROOT_RELS_PART)?;
    let target = rels
        .iter()
        .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_REL) && !rel.external)
        .map(|rel| resolve_target("", &rel.target));

    Ok(target.unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()))
}

/// Parse the relationships of a `.rels` part
pub fn parse_relationships(xml: &[u8], part: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                    external: false,
                };

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| ProcessError::xml(part, e))?
                        .into_owned();
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"TargetMode" => rel.external = value == "External",
                        _ => {}
                    }
                }

                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProcessError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// Parse `(name, relationship id)` pairs from the workbook's `<sheets>` element
pub fn parse_sheet_list(workbook_xml: &[u8], part: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;

                for attr in e.attributes() {
                    let attr = attr.map_err(|e| ProcessError::xml(part, e))?;
                    match (attr.key.prefix().is_some(), attr.key.local_name().as_ref()) {
                        (false, b"name") => {
                            name = Some(
                                attr.unescape_value()
                                    .map_err(|e| ProcessError::xml(part, e))?
                                    .into_owned(),
                            );
                        }
                        // r:id, whatever the relationships namespace prefix is
                        (true, b"id") => {
                            rel_id = Some(
                                attr.unescape_value()
                                    .map_err(|e| ProcessError::xml(part, e))?
                                    .into_owned(),
                            );
                        }
                        _ => {}
                    }
                }

                match (name, rel_id) {
                    (Some(name), Some(rel_id)) => sheets.push((name, rel_id)),
                    (name, _) => {
                        return Err(ProcessError::CorruptWorkbook(format!(
                            "{part}: incomplete <sheet> entry {}",
                            name.unwrap_or_default()
                        )));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProcessError::xml(part, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

/// Path of the `.rels` part that belongs to `part`
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize_path(absolute);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    if base_dir.is_empty() {
        normalize_path(target)
    } else {
        normalize_path(&format!("{base_dir}/{target}"))
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
