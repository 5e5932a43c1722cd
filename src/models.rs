use pdf_column_mapper::{ColumnMapping, ExtractWarning, ExtractedDataset, TargetSchema};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPORT_CONTEXT: &str = "pdf_model";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const EXTRACTION_CACHE_PREFIX: &str = "extract:v1";
pub const EXTRACTION_CACHE_TTL_SECONDS: u32 = 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// Extraction result as stored in the cache and returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractResponse {
    pub digest: String,
    pub dataset: ExtractedDataset,
    pub row_count: usize,
    pub table_count: usize,
    pub warnings: Vec<WarningPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarningPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl From<&ExtractWarning> for WarningPayload {
    fn from(warning: &ExtractWarning) -> Self {
        Self {
            code: warning.code.as_str().to_string(),
            message: warning.message.clone(),
            page: warning.page,
            confidence: warning.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaResponse {
    pub columns: Vec<String>,
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingUpdate {
    pub target: String,
    /// Source column; blank, missing, or the "none" sentinel clears the target.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingRequest {
    pub schema: TargetSchema,
    pub source_columns: Vec<String>,
    /// Choices the client already holds; replaces the default when present.
    #[serde(default)]
    pub mapping: Option<ColumnMapping>,
    #[serde(default)]
    pub set: Option<MappingUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingResponse {
    pub mapping: ColumnMapping,
    /// Dropdown entries, the "none" sentinel first.
    pub choices: Vec<String>,
    pub mapped_count: usize,
    pub export_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
