use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load PDF: {0}")]
    PdfLoad(#[from] lopdf::Error),

    #[error("failed to write spreadsheet: {0}")]
    Spreadsheet(#[from] zip::result::ZipError),

    #[error("no tables found in the document")]
    NoTablesFound,

    #[error("schema file could not be read as a table: {0}")]
    UnreadableSchemaFile(String),

    #[error("column '{0}' does not exist in the schema file")]
    UnknownSchemaColumn(String),

    #[error("'{0}' is not a target schema column")]
    UnknownTargetColumn(String),

    #[error("{0}")]
    IncompleteConfiguration(String),

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no pages available after applying selection")]
    NoPagesSelected,
}

impl From<calamine::Error> for PipelineError {
    fn from(error: calamine::Error) -> Self {
        Self::UnreadableSchemaFile(error.to_string())
    }
}
