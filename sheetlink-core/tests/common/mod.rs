#![allow(dead_code)]

use sheetlink_core::REQUIRED_SHEETS;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Rows for a form sheet, with a few cells sitting on rewrite targets
pub fn form_rows(name: &str) -> String {
    match name {
        "Форма 2" => concat!(
            r#"<row r="1" spans="1:2"><c r="A1" t="inlineStr"><is><t>Форма 2</t></is></c><c r="B1" t="s"><v>0</v></c></row>"#,
            r#"<row r="21" spans="5:6"><c r="E21" s="2"><v>4</v></c><c r="F21" s="3"><v>5</v></c></row>"#,
            r#"<row r="33"><c r="G33" s="3" t="s"><v>1</v></c></row>"#,
            r#"<row r="43" spans="1:8"><c r="A43"><v>43</v></c><c r="H43"><v>8</v></c></row>"#,
            r#"<row r="51"><c r="G51"><f>SUM(G43:G50)</f><v>0</v></c></row>"#,
        )
        .to_string(),
        "Форма 11" => concat!(
            r#"<row r="42"><c r="A42"><v>1</v></c><c r="F42" t="str"><f>A42*2</f><v>2</v></c></row>"#,
            r#"<row r="43"><c r="F43"><v>12.5</v></c></row>"#,
        )
        .to_string(),
        "Форма 20" => r#"<row r="14"><c r="D14"><f>1+1</f><v>2</v></c></row>"#.to_string(),
        other => format!(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>{other}</t></is></c></row><row r="13"><c r="L13"><v>13</v></c></row>"#
        ),
    }
}

/// Every required form, in workbook order
pub fn all_forms() -> Vec<(String, String)> {
    REQUIRED_SHEETS
        .iter()
        .map(|name| (name.to_string(), form_rows(name)))
        .collect()
}

/// Build an `.xlsx` package in memory
pub fn create_mock_xlsx(sheets: &[(String, String)], calc_chain: bool) -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // 1. [Content_Types].xml
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
"#,
    );
    for i in 0..sheets.len() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
    }
    if calc_chain {
        content_types.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
    }
    content_types.push_str("</Types>");
    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types.as_bytes())?;

    // 2. _rels/.rels
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="{REL_NS}/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#
        )
        .as_bytes(),
    )?;

    // 3. docProps/app.xml
    zip.start_file("docProps/app.xml", options)?;
    zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Properties><Application>Microsoft Excel</Application></Properties>"#)?;

    // 4. xl/workbook.xml
    let mut workbook_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{REL_NS}">
<sheets>"#
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            name,
            i + 1,
            i + 1
        ));
    }
    workbook_xml.push_str(r#"</sheets><calcPr calcId="191029"/></workbook>"#);
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml.as_bytes())?;

    // 5. xl/_rels/workbook.xml.rels
    let mut rels_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
"#,
    );
    for i in 0..sheets.len() {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    rels_xml.push_str(&format!(
        r#"<Relationship Id="rId900" Type="{REL_NS}/sharedStrings" Target="sharedStrings.xml"/>"#
    ));
    if calc_chain {
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId901" Type="{REL_NS}/calcChain" Target="calcChain.xml"/>"#
        ));
    }
    rels_xml.push_str("</Relationships>");
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(rels_xml.as_bytes())?;

    // 6. xl/sharedStrings.xml
    zip.start_file("xl/sharedStrings.xml", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="2" uniqueCount="2"><si><t>Итого</t></si><si><t>Выручка</t></si></sst>"#.as_bytes())?;

    // 7. Worksheets
    for (i, (_, rows)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:H51"/><sheetData>{rows}</sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#
            )
            .as_bytes(),
        )?;
    }

    // 8. xl/calcChain.xml
    if calc_chain {
        zip.start_file("xl/calcChain.xml", options)?;
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="G51" i="2"/></calcChain>"#)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Decompressed content of every entry, keyed by name
pub fn read_entries(bytes: &[u8]) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        entries.insert(file.name().to_string(), content);
    }
    Ok(entries)
}

pub fn read_entry_string(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    let entries = read_entries(bytes)?;
    let content = entries
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("missing entry {name}"))?;
    Ok(String::from_utf8(content.clone())?)
}
