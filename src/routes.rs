use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use pdf_column_mapper::{
    ColumnMapping, ExportOptions, ExtractOptions, Extraction, MappingChoice, PageSelection,
    PipelineError, PipelineState, SchemaFileMode, SchemaSource, TargetSchema, UNSET_CHOICE,
    XLSX_MIME_TYPE, build_default_mapping, document_digest, export_file_name, extract_dataset,
    parse_manual_columns, resolve, sanitize_sheet_name,
};
use regex::Regex;
use serde::Serialize;
use worker::{Context, Env, FormData, FormEntry, Request, Response, Result, RouteContext, Router};

use crate::cache;
use crate::error::ApiError;
use crate::models::{
    CacheStatus, DEFAULT_EXPORT_CONTEXT, DEFAULT_MAX_UPLOAD_BYTES, EXTRACTION_CACHE_PREFIX,
    EXTRACTION_CACHE_TTL_SECONDS, ExtractResponse, MappingRequest, MappingResponse,
    SchemaResponse, WarningPayload,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub export_context: String,
    pub sheet_name: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn from_env(env: &Env) -> Self {
        let var = |name: &str| env.var(name).ok().map(|value| value.to_string());
        Self {
            export_context: sanitize_export_context(
                var("EXPORT_CONTEXT").as_deref().unwrap_or(DEFAULT_EXPORT_CONTEXT),
            ),
            sheet_name: sanitize_sheet_name(
                var("EXPORT_SHEET_NAME")
                    .as_deref()
                    .unwrap_or(pdf_column_mapper::DEFAULT_SHEET_NAME),
            ),
            max_upload_bytes: parse_max_upload_bytes(var("MAX_UPLOAD_BYTES").as_deref()),
        }
    }
}

pub async fn handle(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let state = AppState::from_env(&env);

    Router::with_data(state)
        .post_async("/api/v1/extract", extract_route)
        .post_async("/api/v1/schema", schema_route)
        .post_async("/api/v1/mapping", mapping_route)
        .post_async("/api/v1/export", export_route)
        .run(req, env)
        .await
}

async fn extract_route(mut req: Request, ctx: RouteContext<AppState>) -> Result<Response> {
    match extract_response(&mut req, &ctx.data).await {
        Ok((payload, status)) => {
            let mut response = json_response(&payload)?;
            response
                .headers_mut()
                .set("X-Cache-Status", status.as_header_value())?;
            Ok(response)
        }
        Err(error) => error_response(error),
    }
}

async fn schema_route(mut req: Request, _ctx: RouteContext<AppState>) -> Result<Response> {
    match schema_response(&mut req).await {
        Ok(response) => json_response(&response),
        Err(error) => error_response(error),
    }
}

async fn mapping_route(mut req: Request, _ctx: RouteContext<AppState>) -> Result<Response> {
    match mapping_response(&mut req).await {
        Ok(response) => json_response(&response),
        Err(error) => error_response(error),
    }
}

async fn export_route(mut req: Request, ctx: RouteContext<AppState>) -> Result<Response> {
    match export_response(&mut req, &ctx.data).await {
        Ok(response) => Ok(response),
        Err(error) => error_response(error),
    }
}

async fn extract_response(
    req: &mut Request,
    state: &AppState,
) -> Result<(ExtractResponse, CacheStatus), ApiError> {
    let query = parse_query(req)?;
    let (options, fingerprint) = parse_extract_options(&query)?;
    let document = req.bytes().await?;
    check_upload_size(document.len(), state.max_upload_bytes)?;
    load_extraction(&document, &options, &fingerprint).await
}

async fn schema_response(req: &mut Request) -> Result<SchemaResponse, ApiError> {
    let form = req.form_data().await?;
    let schema = schema_from_form(&form).await?;
    Ok(SchemaResponse {
        duplicates: schema.duplicates(),
        columns: schema.columns().to_vec(),
    })
}

async fn mapping_response(req: &mut Request) -> Result<MappingResponse, ApiError> {
    let body = req.text().await?;
    let request = serde_json::from_str::<MappingRequest>(&body)?;
    apply_mapping_request(request)
}

async fn export_response(req: &mut Request, state: &AppState) -> Result<Response, ApiError> {
    let query = parse_query(req)?;
    let context = query
        .get("context")
        .map_or_else(|| state.export_context.clone(), |raw| sanitize_export_context(raw));
    let (options, fingerprint) = parse_extract_options(&query)?;

    let form = req.form_data().await?;
    let document = file_field(&form, "document")
        .await?
        .ok_or_else(|| ApiError::BadRequest("multipart field 'document' is required".to_string()))?;
    check_upload_size(document.len(), state.max_upload_bytes)?;

    let schema = schema_from_form(&form).await?;
    let (extraction, cache_status) = load_extraction(&document, &options, &fingerprint).await?;

    let mut pipeline = PipelineState::default()
        .with_schema(schema)
        .with_dataset(Some(Arc::new(extraction.dataset)));
    if let Some(raw) = text_field(&form, "mapping") {
        let submitted = serde_json::from_str::<ColumnMapping>(&raw)?;
        let aligned = align_mapping(pipeline.schema(), &submitted);
        for entry in aligned.entries() {
            let choice = MappingChoice::parse(entry.source.as_deref().unwrap_or_default());
            pipeline = pipeline.with_choice(&entry.target, choice)?;
        }
    }

    let bytes = pipeline.export(&ExportOptions {
        sheet_name: state.sheet_name.clone(),
        created_at: Some(Utc::now()),
    })?;

    let mut response = Response::from_bytes(bytes)?;
    response.headers_mut().set("Content-Type", XLSX_MIME_TYPE)?;
    response.headers_mut().set(
        "Content-Disposition",
        &content_disposition(&export_file_name(&context)),
    )?;
    response
        .headers_mut()
        .set("X-Cache-Status", cache_status.as_header_value())?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}

async fn load_extraction(
    document: &[u8],
    options: &ExtractOptions,
    fingerprint: &str,
) -> Result<(ExtractResponse, CacheStatus), ApiError> {
    let digest = document_digest(document);
    let key = cache::extraction_key(EXTRACTION_CACHE_PREFIX, &digest, fingerprint);
    if let Some(cached) = cache::get_json::<ExtractResponse>(&key).await? {
        return Ok((cached, CacheStatus::Hit));
    }

    let extraction = extract_dataset(document, options)?;
    worker::console_log!(
        "extracted {} rows from {} tables ({digest})",
        extraction.report.row_count,
        extraction.report.table_count
    );
    let payload = extract_payload(digest, extraction);
    cache::put_json(&key, &payload, EXTRACTION_CACHE_TTL_SECONDS).await?;
    Ok((payload, CacheStatus::Miss))
}

async fn schema_from_form(form: &FormData) -> Result<TargetSchema, ApiError> {
    if let Some(columns) = text_field(form, "columns") {
        return Ok(parse_manual_columns(&columns));
    }
    if let Some(raw) = text_field(form, "schema") {
        return Ok(serde_json::from_str::<TargetSchema>(&raw)?);
    }

    let Some(FormEntry::File(file)) = form.get("file") else {
        return Err(ApiError::BadRequest(
            "provide 'columns', 'schema', or a 'file' upload".to_string(),
        ));
    };
    let mode = text_field(form, "column")
        .filter(|column| !column.trim().is_empty())
        .map_or(SchemaFileMode::HeaderRow, SchemaFileMode::ValueColumn);
    let source = SchemaSource::File {
        bytes: file.bytes().await?,
        file_name: Some(file.name()),
        mode,
    };
    Ok(resolve(&source)?)
}

fn text_field(form: &FormData, name: &str) -> Option<String> {
    match form.get(name) {
        Some(FormEntry::Field(value)) => Some(value),
        _ => None,
    }
}

async fn file_field(form: &FormData, name: &str) -> Result<Option<Vec<u8>>, ApiError> {
    match form.get(name) {
        Some(FormEntry::File(file)) => Ok(Some(file.bytes().await?)),
        _ => Ok(None),
    }
}

fn json_response<T>(payload: &T) -> Result<Response>
where
    T: Serialize,
{
    let mut response = Response::from_json(payload)?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}

fn error_response(error: ApiError) -> Result<Response> {
    if matches!(error, ApiError::Internal(_)) {
        worker::console_error!("request failed: {error}");
    }
    error.into_response()
}

fn parse_query(req: &Request) -> Result<HashMap<String, String>, ApiError> {
    let url = req.url()?;
    let query = url
        .query_pairs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<HashMap<_, _>>();
    Ok(query)
}

/// Reads `pages` and `min_cols`; the second value keys the extraction cache.
pub fn parse_extract_options(
    query: &HashMap<String, String>,
) -> Result<(ExtractOptions, String), ApiError> {
    let mut options = ExtractOptions::default();
    let mut fingerprint = Vec::new();

    if let Some(raw) = query.get("pages").filter(|raw| !raw.trim().is_empty()) {
        let selection = raw
            .parse::<PageSelection>()
            .map_err(PipelineError::InvalidPageSelection)?;
        options.pages = Some(selection);
        fingerprint.push(format!("p={}", raw.trim()));
    }

    if let Some(raw) = query.get("min_cols") {
        let min_cols = raw
            .trim()
            .parse::<usize>()
            .map_err(|error| ApiError::BadRequest(format!("invalid min_cols: {error}")))?;
        if min_cols < 2 {
            return Err(ApiError::BadRequest("min_cols must be at least 2".to_string()));
        }
        if min_cols != options.min_cols {
            fingerprint.push(format!("c={min_cols}"));
        }
        options.min_cols = min_cols;
    }

    Ok((options, fingerprint.join(";")))
}

pub fn extract_payload(digest: String, extraction: Extraction) -> ExtractResponse {
    ExtractResponse {
        digest,
        row_count: extraction.report.row_count,
        table_count: extraction.report.table_count,
        warnings: extraction
            .report
            .warnings
            .iter()
            .map(WarningPayload::from)
            .collect(),
        dataset: extraction.dataset,
    }
}

/// Keeps only the submitted choices whose target is in `schema`, in schema order.
pub fn align_mapping(schema: &TargetSchema, submitted: &ColumnMapping) -> ColumnMapping {
    ColumnMapping::from_pairs(
        schema,
        submitted.entries().iter().map(|entry| {
            (
                entry.target.clone(),
                MappingChoice::parse(entry.source.as_deref().unwrap_or_default()),
            )
        }),
    )
}

/// Dropdown entries offered for every target: the "none" sentinel, then each source column.
pub fn mapping_choices(source_columns: &[String]) -> Vec<String> {
    std::iter::once(UNSET_CHOICE.to_string())
        .chain(source_columns.iter().cloned())
        .collect()
}

pub fn apply_mapping_request(request: MappingRequest) -> Result<MappingResponse, ApiError> {
    let mut mapping = match &request.mapping {
        Some(submitted) => align_mapping(&request.schema, submitted),
        None => build_default_mapping(&request.schema, &request.source_columns),
    };

    if let Some(update) = &request.set {
        mapping = pdf_column_mapper::set_mapping(
            &mapping,
            &update.target,
            MappingChoice::parse(update.source.as_deref().unwrap_or_default()),
        )?;
    }

    let mapped_count = mapping.mapped_count();
    // No source columns means nothing has been extracted yet.
    let export_ready =
        !request.schema.is_empty() && !request.source_columns.is_empty() && mapped_count > 0;
    Ok(MappingResponse {
        choices: mapping_choices(&request.source_columns),
        export_ready,
        mapped_count,
        mapping,
    })
}

/// Reduces a user-supplied context to filename-safe characters.
pub fn sanitize_export_context(raw: &str) -> String {
    let Ok(unsafe_re) = Regex::new(r"[^A-Za-z0-9_-]+") else {
        return DEFAULT_EXPORT_CONTEXT.to_string();
    };
    let cleaned = unsafe_re.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        DEFAULT_EXPORT_CONTEXT.to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename=\"{file_name}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

pub fn parse_max_upload_bytes(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
}

pub fn check_upload_size(len: usize, max_upload_bytes: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::BadRequest("uploaded document is empty".to_string()));
    }
    if len > max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "document is {len} bytes, limit is {max_upload_bytes}"
        )));
    }
    Ok(())
}
