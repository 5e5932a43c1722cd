//! Minimal single-sheet OOXML workbook writer.
//!
//! Every cell is written as an inline string so exported values keep their exact text
//! (leading zeros in phone numbers, postal codes, and so on).

use std::fmt::Write as _;
use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::PipelineError;
use crate::materialize::FinalTable;
use crate::options::{DEFAULT_SHEET_NAME, ExportOptions};

pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MAX_SHEET_NAME_CHARS: usize = 31;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="49" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="49" fontId="1" fillId="0" borderId="0" xfId="0" applyNumberFormat="1" applyFont="1"/></cellXfs></styleSheet>"#;

/// Escapes text for XML content and attribute values; drops characters XML 1.0 cannot carry.
fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(ch),
            '\u{FFFE}' | '\u{FFFF}' => {}
            ch if ch.is_control() => {}
            ch => out.push(ch),
        }
    }
    out
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
fn column_letters(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + u8::try_from(rem).unwrap_or_default()));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Applies the sheet-name rules spreadsheet applications enforce.
#[must_use]
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .filter(|ch| !matches!(ch, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect::<String>();
    let cleaned = cleaned.trim().trim_matches('\'');
    if cleaned.is_empty() {
        return DEFAULT_SHEET_NAME.to_string();
    }
    cleaned.chars().take(MAX_SHEET_NAME_CHARS).collect()
}

/// `export_<context>.xlsx`
#[must_use]
pub fn export_file_name(context: &str) -> String {
    format!("export_{context}.xlsx")
}

fn write_row(xml: &mut String, row_number: usize, cells: &[String], style: u8) {
    let _ = write!(xml, r#"<row r="{row_number}">"#);
    for (index, value) in cells.iter().enumerate() {
        let reference = format!("{}{row_number}", column_letters(index));
        let _ = write!(
            xml,
            r#"<c r="{reference}" s="{style}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            escape_xml(value)
        );
    }
    xml.push_str("</row>");
}

fn sheet_xml(table: &FinalTable) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    write_row(&mut xml, 1, &table.columns, 1);
    for (index, row) in table.rows.iter().enumerate() {
        write_row(&mut xml, index + 2, row, 0);
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_xml(sheet_name)
    )
}

fn core_properties_xml(options: &ExportOptions) -> String {
    let created = options
        .created_at
        .map(|timestamp| {
            let stamp = timestamp.format("%Y-%m-%dT%H:%M:%SZ");
            format!(
                r#"<dcterms:created xsi:type="dcterms:W3CDTF">{stamp}</dcterms:created><dcterms:modified xsi:type="dcterms:W3CDTF">{stamp}</dcterms:modified>"#
            )
        })
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title>{created}</cp:coreProperties>"#,
        escape_xml(&options.sheet_name)
    )
}

/// Writes `table` as a one-sheet workbook whose first row is the column list.
///
/// # Errors
///
/// Only when the ZIP encoder fails.
pub fn serialize(table: &FinalTable, options: &ExportOptions) -> Result<Vec<u8>, PipelineError> {
    let sheet_name = sanitize_sheet_name(&options.sheet_name);
    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("docProps/core.xml", core_properties_xml(options)),
        ("xl/workbook.xml", workbook_xml(&sheet_name)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        ("xl/styles.xml", STYLES.to_string()),
        ("xl/worksheets/sheet1.xml", sheet_xml(table)),
    ];

    let file_options =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, body) in parts {
        zip.start_file(path, file_options)?;
        zip.write_all(body.as_bytes())?;
    }
    let bytes = zip.finish()?.into_inner();

    tracing::debug!(
        rows = table.rows.len(),
        columns = table.columns.len(),
        bytes = bytes.len(),
        "spreadsheet written"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, open_workbook_auto_from_rs};
    use pretty_assertions::assert_eq;

    use super::{column_letters, escape_xml, export_file_name, sanitize_sheet_name, serialize};
    use crate::materialize::FinalTable;
    use crate::options::ExportOptions;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn escapes_markup_and_strips_control_characters() {
        assert_eq!(escape_xml("a<b & \"c\"\u{0007}"), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape_xml("x\u{FFFE}y\u{FFFF}z"), "xyz");
    }

    #[test]
    fn sheet_names_follow_spreadsheet_rules() {
        assert_eq!(sanitize_sheet_name("Q1/Q2: [draft]"), "Q1Q2 draft");
        assert_eq!(sanitize_sheet_name("???"), "Données");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn file_name_carries_context() {
        assert_eq!(export_file_name("pdf_model"), "export_pdf_model.xlsx");
    }

    #[test]
    fn workbook_reads_back_with_schema_header_and_text_cells() {
        let table = FinalTable {
            columns: vec!["nom".to_string(), "telephone".to_string()],
            rows: vec![
                vec!["Alice & Co".to_string(), "0601020304".to_string()],
                vec!["Bob".to_string(), String::new()],
            ],
        };
        let bytes = serialize(&table, &ExportOptions::default()).expect("serialize");

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).expect("open workbook");
        assert_eq!(workbook.sheet_names(), vec!["Données".to_string()]);
        let range = workbook
            .worksheet_range_at(0)
            .expect("first sheet")
            .expect("readable sheet");
        let rows = range.rows().collect::<Vec<_>>();

        assert_eq!(rows[0], [Data::String("nom".into()), Data::String("telephone".into())]);
        assert_eq!(rows[1][0], Data::String("Alice & Co".into()));
        assert_eq!(rows[1][1], Data::String("0601020304".into()));
        assert_eq!(rows.len(), 3);
    }
}
