//! Minimal `.xlsx` packages for unit tests

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::forms::REQUIRED_SHEETS;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

#[derive(Default)]
pub(crate) struct PackageBuilder {
    sheets: Vec<(String, String)>,
    calc_chain: bool,
    skipped: Vec<String>,
}

impl PackageBuilder {
    /// Add a sheet with the given `<sheetData>` children
    pub(crate) fn sheet(mut self, name: &str, rows: &str) -> Self {
        self.sheets.push((name.to_string(), rows.to_string()));
        self
    }

    pub(crate) fn calc_chain(mut self) -> Self {
        self.calc_chain = true;
        self
    }

    /// Leave a part out of the archive
    pub(crate) fn without_part(mut self, name: &str) -> Self {
        self.skipped.push(name.to_string());
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        let mut types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        let mut workbook = format!(r#"<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
        let mut rels = String::from(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );

        for (idx, (name, _)) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            workbook.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        workbook.push_str(r#"</sheets><calcPr calcId="191029"/></workbook>"#);
        if self.calc_chain {
            types.push_str(r#"<Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#);
            rels.push_str(&format!(
                r#"<Relationship Id="rId100" Type="{REL_NS}/calcChain" Target="calcChain.xml"/>"#
            ));
        }
        types.push_str("</Types>");
        rels.push_str("</Relationships>");

        let mut put = |name: &str, content: &str| {
            if self.skipped.iter().any(|s| s == name) {
                return;
            }
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        };

        put("[Content_Types].xml", &types);
        put(
            "_rels/.rels",
            &format!(
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
            ),
        );
        put("xl/workbook.xml", &workbook);
        put("xl/_rels/workbook.xml.rels", &rels);
        for (idx, (_, rows)) in self.sheets.iter().enumerate() {
            put(
                &format!("xl/worksheets/sheet{}.xml", idx + 1),
                &format!(r#"<worksheet xmlns="{MAIN_NS}"><sheetData>{rows}</sheetData></worksheet>"#),
            );
        }
        if self.calc_chain {
            put(
                "xl/calcChain.xml",
                &format!(r#"<calcChain xmlns="{MAIN_NS}"><c r="A1" i="1"/></calcChain>"#),
            );
        }

        zip.finish().unwrap().into_inner()
    }
}

/// Every required form, each with a single literal cell
pub(crate) fn all_forms() -> PackageBuilder {
    REQUIRED_SHEETS.iter().fold(PackageBuilder::default(), |builder, name| {
        builder.sheet(name, r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
    })
}
