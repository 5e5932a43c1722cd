use std::fmt::{Display, Formatter};

use pdf_column_mapper::PipelineError;
use worker::{Response, Result};

use crate::models::ErrorResponse;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    NoTablesFound(String),
    Parse(String),
    IncompleteConfiguration(String),
    Internal(String),
}

impl ApiError {
    /// HTTP status and stable machine-readable code.
    fn classify(&self) -> (u16, &'static str) {
        match self {
            Self::BadRequest(_) => (400, "bad_request"),
            Self::PayloadTooLarge(_) => (413, "payload_too_large"),
            Self::NoTablesFound(_) => (422, "no_tables_found"),
            Self::Parse(_) => (422, "parse_error"),
            Self::IncompleteConfiguration(_) => (422, "incomplete_configuration"),
            Self::Internal(_) => (500, "internal_error"),
        }
    }

    pub fn code(&self) -> &'static str {
        self.classify().1
    }

    pub fn status_code(&self) -> u16 {
        self.classify().0
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message)
            | Self::PayloadTooLarge(message)
            | Self::NoTablesFound(message)
            | Self::Parse(message)
            | Self::IncompleteConfiguration(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn into_response(self) -> Result<Response> {
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.message().to_string(),
        };
        let mut response = Response::from_json(&body)?.with_status(self.status_code());
        response.headers_mut().set("Cache-Control", "no-store")?;
        Ok(response)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let message = error.to_string();
        match error {
            PipelineError::NoTablesFound | PipelineError::NoPagesSelected => {
                Self::NoTablesFound(message)
            }
            PipelineError::PdfLoad(_)
            | PipelineError::UnreadableSchemaFile(_)
            | PipelineError::Csv(_) => Self::Parse(message),
            PipelineError::IncompleteConfiguration(_) => Self::IncompleteConfiguration(message),
            PipelineError::UnknownSchemaColumn(_)
            | PipelineError::UnknownTargetColumn(_)
            | PipelineError::InvalidPageSelection(_)
            | PipelineError::InvalidOption(_) => Self::BadRequest(message),
            PipelineError::Io(_) | PipelineError::Spreadsheet(_) => Self::Internal(message),
        }
    }
}

impl From<worker::Error> for ApiError {
    fn from(error: worker::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
