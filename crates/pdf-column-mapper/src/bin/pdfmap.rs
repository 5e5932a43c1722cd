use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_column_mapper::{
    ExportOptions, ExtractOptions, Extraction, MappingChoice, PageSelection, PipelineError,
    PipelineState, SchemaFileMode, SchemaSource, TargetSchema, dataset_to_csv, extract_dataset,
    resolve, serialize_csv,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdfmap",
    version,
    about = "Extract PDF tables and export them under your own column schema"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract every table of a PDF into one CSV (or JSON) dataset.
    Extract(ExtractArgs),
    /// Print the target schema resolved from text or a CSV/Excel file.
    Schema(SchemaArgs),
    /// Extract, map onto the target schema and write the final spreadsheet.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct PdfArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Minimum cells required per candidate table row.
    #[arg(long, default_value_t = 2)]
    min_cols: usize,
}

#[derive(Debug, Args)]
struct SchemaInput {
    /// Comma-separated target columns, e.g. "nom,prenom,telephone,email".
    #[arg(long, conflicts_with = "schema_file")]
    columns: Option<String>,

    /// CSV or Excel file describing the target columns.
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Take the schema from this column's values instead of the file's header row.
    #[arg(long, requires = "schema_file")]
    value_column: Option<String>,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[command(flatten)]
    pdf: PdfArgs,

    /// Output path for the dataset.
    #[arg(short, long)]
    output: PathBuf,

    /// Write JSON instead of CSV.
    #[arg(long)]
    json: bool,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Print extraction warnings.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct SchemaArgs {
    #[command(flatten)]
    schema: SchemaInput,

    /// Print the schema as a JSON array.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Xlsx,
    Csv,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(flatten)]
    pdf: PdfArgs,

    #[command(flatten)]
    schema: SchemaInput,

    /// Output file path.
    #[arg(short, long)]
    output: PathBuf,

    /// Mapping override `target=source`; `target=` clears it. Repeatable.
    #[arg(long = "map")]
    mappings: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Xlsx)]
    format: OutputFormat,

    /// Worksheet name for xlsx output.
    #[arg(long, default_value = pdf_column_mapper::DEFAULT_SHEET_NAME)]
    sheet_name: String,

    /// Print extraction warnings and the mapping in use.
    #[arg(short, long)]
    verbose: bool,
}

fn ascii_delimiter(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow!("delimiter must be a single ASCII character"))
}

fn extract_options(args: &PdfArgs) -> Result<ExtractOptions> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(PipelineError::InvalidPageSelection)
        .context("failed to parse --pages")?;

    Ok(ExtractOptions {
        pages,
        min_cols: args.min_cols,
        ..ExtractOptions::default()
    })
}

fn run_extraction(args: &PdfArgs) -> Result<Extraction> {
    let options = extract_options(args)?;
    let document = std::fs::read(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    extract_dataset(&document, &options)
        .with_context(|| format!("failed to extract tables from '{}'", args.input.display()))
}

fn schema_source(input: &SchemaInput) -> Result<SchemaSource> {
    if let Some(columns) = &input.columns {
        return Ok(SchemaSource::Manual(columns.clone()));
    }

    let path = input
        .schema_file
        .as_ref()
        .ok_or_else(|| anyhow!("pass either --columns or --schema-file"))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let mode = input
        .value_column
        .clone()
        .map_or(SchemaFileMode::HeaderRow, SchemaFileMode::ValueColumn);

    Ok(SchemaSource::File {
        bytes,
        file_name: path.file_name().map(|name| name.to_string_lossy().into_owned()),
        mode,
    })
}

fn resolve_schema(input: &SchemaInput) -> Result<TargetSchema> {
    let source = schema_source(input)?;
    resolve(&source).context("failed to resolve target schema")
}

fn parse_mapping_override(value: &str) -> Result<(String, MappingChoice)> {
    let (target, source) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid --map '{value}', expected target=source"))?;
    let target = target.trim();
    if target.is_empty() {
        anyhow::bail!("invalid --map '{value}', target must be non-empty");
    }
    Ok((target.to_string(), MappingChoice::parse(source)))
}

fn log_extraction(extraction: &Extraction, verbose: bool) {
    let report = &extraction.report;
    if report.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} page={:?} region={:?} confidence={:?}: {}",
                warning.code, warning.page, warning.region, warning.confidence, warning.message
            );
        }
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    let delimiter = ascii_delimiter(args.delimiter)?;
    let extraction = run_extraction(&args.pdf)?;
    log_extraction(&extraction, args.verbose);

    let body = if args.json {
        serde_json::to_string_pretty(&extraction.dataset)?
    } else {
        dataset_to_csv(&extraction.dataset, delimiter)?
    };
    write_output(&args.output, body.as_bytes())
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    let schema = resolve_schema(&args.schema)?;
    if args.json {
        println!("{}", serde_json::to_string(&schema)?);
    } else {
        for column in schema.columns() {
            println!("{column}");
        }
    }
    for duplicate in schema.duplicates() {
        eprintln!("warning: column '{duplicate}' is listed more than once");
    }
    Ok(())
}

fn run_export(args: &ExportArgs) -> Result<()> {
    let schema = resolve_schema(&args.schema)?;
    let extraction = run_extraction(&args.pdf)?;
    log_extraction(&extraction, args.verbose);

    let mut state = PipelineState::default()
        .with_schema(schema)
        .with_dataset(Some(extraction.dataset.into()));
    for value in &args.mappings {
        let (target, choice) = parse_mapping_override(value)?;
        state = state
            .with_choice(&target, choice)
            .with_context(|| format!("failed to apply --map '{value}'"))?;
    }

    let source_columns = state
        .dataset()
        .map(|dataset| dataset.source_columns().to_vec())
        .unwrap_or_default();
    for (target, source) in state.mapping().missing_sources(&source_columns) {
        eprintln!("warning: '{target}' is mapped to '{source}', which the PDF does not contain");
    }

    if args.verbose {
        for entry in state.mapping().entries() {
            eprintln!(
                "  {} <- {}",
                entry.target,
                entry.source.as_deref().unwrap_or(pdf_column_mapper::UNSET_CHOICE)
            );
        }
    }

    let bytes = match args.format {
        OutputFormat::Xlsx => state.export(&ExportOptions {
            sheet_name: args.sheet_name.clone(),
            created_at: Some(Utc::now()),
        })?,
        OutputFormat::Csv => serialize_csv(&state.final_table()?, b',')?.into_bytes(),
    };
    write_output(&args.output, &bytes)
}

/// `2` when there is nothing to export, `1` for every other failure.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::NoTablesFound | PipelineError::IncompleteConfiguration(_)) => {
            ExitCode::from(2)
        }
        _ => ExitCode::from(1),
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_column_mapper=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Schema(args) => run_schema(args),
        Commands::Export(args) => run_export(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            exit_code_for(&error)
        }
    }
}
