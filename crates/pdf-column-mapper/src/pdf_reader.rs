use std::collections::BTreeMap;

use encoding_rs::{UTF_16BE, WINDOWS_1252};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use crate::error::PipelineError;
use crate::model::PageText;
use crate::options::PageSelection;
use crate::table_parse::{soft_split_line_into_cells, split_line_into_cells};

/// Text of the selected pages, plus the whole-document text when the page split was unusable.
pub(crate) struct DocumentText {
    pub pages: Vec<PageText>,
    pub whole: Option<String>,
}

fn split_form_feed_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    if total == 0 {
        return false;
    }

    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();

    replacement * 8 > total || control * 5 > total
}

fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(rest);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    let lower = encoding.map(str::to_ascii_lowercase).unwrap_or_default();
    if lower.contains("identity-h") || lower.contains("ucs2") || lower.contains("utf16") {
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    // Latin documents are overwhelmingly WinAnsi; accented headers survive this path.
    let (latin, _, _) = WINDOWS_1252.decode(bytes);
    latin.into_owned()
}

fn text_quality_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut multi_cell_lines = 0_i64;
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        non_empty_lines += 1;
        if split_line_into_cells(line).len() >= 2 || soft_split_line_into_cells(line).len() >= 3 {
            multi_cell_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    multi_cell_lines * 50 + non_empty_lines - broken_penalty
}

/// Accumulates shown strings into lines, breaking on text positioning operators.
#[derive(Default)]
struct LineCollector {
    lines: Vec<String>,
    current: String,
}

impl LineCollector {
    fn break_line(&mut self) {
        if self.current.trim().is_empty() {
            self.current.clear();
        } else {
            self.lines.push(std::mem::take(&mut self.current));
        }
    }

    fn show(&mut self, encoding: Option<&str>, operands: &[Object]) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => self.current.push_str(&decode_pdf_bytes(encoding, bytes)),
                Object::Array(items) => {
                    self.show(encoding, items);
                    self.current.push(' ');
                }
                // Large negative kerning in TJ arrays is a visual gap between cells.
                Object::Integer(value) if *value < -100 => self.current.push(' '),
                Object::Real(value) if *value < -100.0 => self.current.push(' '),
                _ => {}
            }
        }
    }

    fn finish(mut self) -> Option<String> {
        self.break_line();
        (!self.lines.is_empty()).then(|| self.lines.join("\n"))
    }
}

fn content_stream_text(document: &Document, page_id: ObjectId) -> Option<String> {
    let content = Content::decode(&document.get_page_content(page_id).ok()?).ok()?;
    let font_encodings = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect::<BTreeMap<Vec<u8>, &str>>();

    let mut collector = LineCollector::default();
    let mut encoding = None;
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                encoding = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                    .and_then(|name| font_encodings.get(name).copied());
            }
            "Tj" | "TJ" => collector.show(encoding, &operation.operands),
            // `'` and `"` move to the next line before showing their string.
            "'" | "\"" => {
                collector.break_line();
                collector.show(encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "Tm" | "ET" => collector.break_line(),
            _ => {}
        }
    }
    collector.finish()
}

/// Reads every selected page, keeping whichever text extraction strategy looks most tabular.
pub(crate) fn read_pdf_pages(
    input_pdf: &[u8],
    page_selection: Option<&PageSelection>,
) -> Result<DocumentText, PipelineError> {
    let document = Document::load_mem(input_pdf)?;
    let pages_map = document.get_pages();

    let (split_pages, whole) = match pdf_extract::extract_text_from_mem(input_pdf) {
        Ok(text) => {
            let pages = split_form_feed_pages(&text);
            if pages.len() == pages_map.len() {
                (Some(pages), None)
            } else {
                (None, Some(text))
            }
        }
        Err(error) => {
            tracing::debug!(%error, "pdf-extract failed; using content streams only");
            (None, None)
        }
    };

    let mut pages = Vec::new();
    for (index, (page_no, page_id)) in pages_map.iter().enumerate() {
        if page_selection.is_some_and(|selection| !selection.contains(*page_no)) {
            continue;
        }

        let mut candidates = Vec::new();
        if let Some(text) = split_pages.as_ref().and_then(|pages| pages.get(index)) {
            candidates.push(text.clone());
        }
        if let Some(text) = content_stream_text(&document, *page_id) {
            candidates.push(text);
        }
        if let Ok(text) = document.extract_text(&[*page_no]) {
            candidates.push(text);
        }

        let text = candidates
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .max_by_key(|text| text_quality_score(text))
            .unwrap_or_default();

        pages.push(PageText {
            page_number: *page_no,
            text,
        });
    }

    if pages.is_empty() {
        return Err(PipelineError::NoPagesSelected);
    }

    Ok(DocumentText {
        pages,
        whole: whole.filter(|text| !text.trim().is_empty()),
    })
}
