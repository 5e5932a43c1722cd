use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Ordered list of the columns the export must contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSchema(Vec<String>);

impl TargetSchema {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self(columns)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names listed more than once. They alias the same mapping entry in the export.
    #[must_use]
    pub fn duplicates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for column in &self.0 {
            if !seen.insert(column.as_str()) && !duplicates.contains(column) {
                duplicates.push(column.clone());
            }
        }
        duplicates
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFileMode {
    HeaderRow,
    ValueColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Manual(String),
    File {
        bytes: Vec<u8>,
        file_name: Option<String>,
        mode: SchemaFileMode,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Csv,
    Workbook,
}

fn detect_kind(bytes: &[u8], file_name: Option<&str>) -> FileKind {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv" | "txt") => FileKind::Csv,
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => FileKind::Workbook,
        _ if bytes.starts_with(b"PK\x03\x04")
            || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) =>
        {
            FileKind::Workbook
        }
        _ => FileKind::Csv,
    }
}

/// Splits a comma-separated list of column names, dropping blanks.
#[must_use]
pub fn parse_manual_columns(input: &str) -> TargetSchema {
    TargetSchema(
        input
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Int(value) => value.to_string(),
        #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            (*value as i64).to_string()
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        other => other.to_string(),
    }
}

/// Header row plus data rows, all as strings.
type StringTable = (Vec<String>, Vec<Vec<String>>);

fn read_workbook(bytes: &[u8]) -> Result<StringTable, PipelineError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::UnreadableSchemaFile("workbook has no sheets".to_string()))??;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let header = rows
        .next()
        .ok_or_else(|| PipelineError::UnreadableSchemaFile("first sheet is empty".to_string()))?;
    Ok((header, rows.collect()))
}

fn read_csv(bytes: &[u8]) -> Result<StringTable, PipelineError> {
    let text = std::str::from_utf8(bytes).map_err(|error| {
        PipelineError::UnreadableSchemaFile(format!("CSV is not valid UTF-8: {error}"))
    })?;
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let header = reader
        .headers()
        .map_err(|error| PipelineError::UnreadableSchemaFile(error.to_string()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if header.iter().all(|cell| cell.trim().is_empty()) {
        return Err(PipelineError::UnreadableSchemaFile(
            "CSV has no header row".to_string(),
        ));
    }

    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|record| record.iter().map(str::to_string).collect::<Vec<_>>())
                .map_err(|error| PipelineError::UnreadableSchemaFile(error.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((header, rows))
}

/// Semicolon exports are common from French spreadsheet locales.
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let count = |needle: char| first_line.matches(needle).count();
    if count(';') > count(',') {
        b';'
    } else if count('\t') > count(',') {
        b'\t'
    } else {
        b','
    }
}

fn resolve_file(
    bytes: &[u8],
    file_name: Option<&str>,
    mode: &SchemaFileMode,
) -> Result<TargetSchema, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::UnreadableSchemaFile(
            "schema file is empty".to_string(),
        ));
    }

    let (header, rows) = match detect_kind(bytes, file_name) {
        FileKind::Workbook => read_workbook(bytes)?,
        FileKind::Csv => read_csv(bytes)?,
    };

    let columns = match mode {
        SchemaFileMode::HeaderRow => header
            .iter()
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(str::to_string)
            .collect(),
        SchemaFileMode::ValueColumn(name) => {
            let index = header
                .iter()
                .position(|cell| cell.trim() == name.trim())
                .ok_or_else(|| PipelineError::UnknownSchemaColumn(name.clone()))?;
            rows.iter()
                .filter_map(|row| row.get(index))
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .collect()
        }
    };

    Ok(TargetSchema(columns))
}

/// Derives the target schema from manual text or a structured file.
///
/// # Errors
///
/// `UnreadableSchemaFile` when the file cannot be parsed as a table, `UnknownSchemaColumn` when
/// the value column is not in the file's header.
pub fn resolve(source: &SchemaSource) -> Result<TargetSchema, PipelineError> {
    let schema = match source {
        SchemaSource::Manual(text) => parse_manual_columns(text),
        SchemaSource::File {
            bytes,
            file_name,
            mode,
        } => resolve_file(bytes, file_name.as_deref(), mode)?,
    };

    let duplicates = schema.duplicates();
    if !duplicates.is_empty() {
        tracing::warn!(?duplicates, "target schema lists columns more than once");
    }
    Ok(schema)
}

/// Host-facing form: a failed resolution yields an empty schema plus the error to show.
#[must_use]
pub fn resolve_or_empty(source: &SchemaSource) -> (TargetSchema, Option<PipelineError>) {
    match resolve(source) {
        Ok(schema) => (schema, None),
        Err(error) => {
            tracing::warn!(%error, "schema resolution failed");
            (TargetSchema::default(), Some(error))
        }
    }
}
