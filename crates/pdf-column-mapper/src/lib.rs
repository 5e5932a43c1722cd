//! Reconcile tables extracted from PDFs against a target column schema and export a spreadsheet.
//!
//! The pipeline runs strictly forward:
//! document bytes → [`TableExtractor`] → [`ExtractedDataset`] → (with a [`TargetSchema`]) →
//! [`ColumnMapping`] → [`materialize`] → [`FinalTable`] → [`serialize`].
//! Every stage returns a new value; [`PipelineState`] threads them through host interactions.

mod csv_out;
mod error;
mod extract;
mod mapping;
mod materialize;
mod model;
mod options;
mod pdf_reader;
mod schema;
mod session;
mod table_detect;
mod table_parse;
mod warning;
mod xlsx_out;

use crate::csv_out::write_csv_to_string;

pub use error::PipelineError;
pub use extract::{
    Extraction, ExtractionReport, TableExtractor, TableSource, TextLayoutSource, normalize_tables,
};
pub use mapping::{
    ColumnMapping, MappingChoice, MappingEntry, UNSET_CHOICE, build_default_mapping, set_mapping,
};
pub use materialize::{FinalTable, check_ready, materialize};
pub use model::{ExtractedDataset, PAGE_COLUMN, PageTable, RawCell, Record};
pub use options::{DEFAULT_SHEET_NAME, ExportOptions, ExtractOptions, PageSelection};
pub use schema::{
    SchemaFileMode, SchemaSource, TargetSchema, parse_manual_columns, resolve, resolve_or_empty,
};
pub use session::{ExtractionMemo, PipelineState, document_digest};
pub use warning::{ExtractWarning, WarningCode as ExtractWarningCode};
pub use xlsx_out::{XLSX_MIME_TYPE, export_file_name, sanitize_sheet_name, serialize};

/// Extracts every table of `document` with the default text-layout source.
///
/// # Errors
///
/// `NoTablesFound` when no tabular region exists, `PdfLoad` for unreadable documents.
pub fn extract_dataset(
    document: &[u8],
    options: &ExtractOptions,
) -> Result<Extraction, PipelineError> {
    TableExtractor::with_options(options.clone()).extract(document)
}

/// Flattens a dataset to CSV, provenance column first.
///
/// # Errors
///
/// Only when the CSV writer fails.
pub fn dataset_to_csv(dataset: &ExtractedDataset, delimiter: u8) -> Result<String, PipelineError> {
    let (headers, rows) = dataset.to_rows();
    write_csv_to_string(&headers, &rows, delimiter)
}

/// CSV rendering of the export table, header row first.
///
/// # Errors
///
/// Only when the CSV writer fails.
pub fn serialize_csv(table: &FinalTable, delimiter: u8) -> Result<String, PipelineError> {
    write_csv_to_string(&table.columns, &table.rows, delimiter)
}
