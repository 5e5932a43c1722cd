use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::error::PipelineError;
use crate::model::{ExtractedDataset, PAGE_COLUMN, PageTable, PageText, RawCell, Record};
use crate::options::ExtractOptions;
use crate::pdf_reader::read_pdf_pages;
use crate::table_detect::{LOW_CONFIDENCE_THRESHOLD, detect_all};
use crate::warning::{ExtractWarning, WarningCode};

/// Capability boundary: document bytes in, page-level grids of raw cells out.
pub trait TableSource {
    fn page_tables(
        &self,
        document: &[u8],
        warnings: &mut Vec<ExtractWarning>,
    ) -> Result<Vec<PageTable>, PipelineError>;
}

/// Finds tables by laying out page text and grouping lines that split into cells.
#[derive(Debug, Clone, Default)]
pub struct TextLayoutSource {
    options: ExtractOptions,
}

impl TextLayoutSource {
    #[must_use]
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }
}

impl TableSource for TextLayoutSource {
    fn page_tables(
        &self,
        document: &[u8],
        warnings: &mut Vec<ExtractWarning>,
    ) -> Result<Vec<PageTable>, PipelineError> {
        if self.options.min_cols < 2 {
            return Err(PipelineError::InvalidOption(
                "min_cols must be at least 2".to_string(),
            ));
        }

        let text = read_pdf_pages(document, self.options.pages.as_ref())?;
        let tables = detect_all(&text.pages, self.options.min_cols);
        if !tables.is_empty() || !self.options.document_fallback {
            return Ok(tables);
        }

        let Some(whole) = text.whole else {
            return Ok(tables);
        };
        let fallback = detect_all(
            &[PageText {
                page_number: 1,
                text: whole,
            }],
            self.options.min_cols,
        );
        if !fallback.is_empty() {
            warnings.push(ExtractWarning::new(
                WarningCode::DocumentTextFallback,
                "no page-level tables detected; retried on document-level text, pages are approximate",
            ));
        }
        Ok(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub row_count: usize,
    pub table_count: usize,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub dataset: ExtractedDataset,
    pub report: ExtractionReport,
}

pub struct TableExtractor<S = TextLayoutSource> {
    source: S,
}

impl TableExtractor<TextLayoutSource> {
    #[must_use]
    pub fn with_options(options: ExtractOptions) -> Self {
        Self::new(TextLayoutSource::new(options))
    }
}

impl<S: TableSource> TableExtractor<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Runs detection and normalizes every region into one dataset.
    ///
    /// # Errors
    ///
    /// `NoTablesFound` when no page holds a non-empty region, or whatever the source reports
    /// for unreadable documents.
    pub fn extract(&self, document: &[u8]) -> Result<Extraction, PipelineError> {
        let mut warnings = Vec::new();
        let tables = self.source.page_tables(document, &mut warnings)?;
        let dataset = normalize_tables(&tables, &mut warnings).ok_or(PipelineError::NoTablesFound)?;

        tracing::debug!(
            rows = dataset.records.len(),
            tables = dataset.table_count,
            columns = dataset.columns.len(),
            "extraction completed"
        );

        Ok(Extraction {
            report: ExtractionReport {
                row_count: dataset.records.len(),
                table_count: dataset.table_count,
                warnings,
            },
            dataset,
        })
    }
}

fn header_name(cell: Option<&RawCell>, index: usize) -> String {
    cell.and_then(Option::as_deref)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| format!("col_{}", index + 1), str::to_string)
}

/// Turns a header row into unique string keys for a region `width` cells wide.
pub(crate) fn coerce_headers(raw: &[RawCell], width: usize) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut renamed = Vec::new();
    let mut headers = Vec::with_capacity(width);

    for index in 0..width {
        let base = header_name(raw.get(index), index);
        let mut name = base.clone();
        let mut suffix = 1;
        while name == PAGE_COLUMN || seen.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        if name != base {
            renamed.push(name.clone());
        }
        seen.insert(name.clone());
        headers.push(name);
    }

    (headers, renamed)
}

/// Applies the fixed header-row policy to each region and concatenates them in order.
///
/// Returns `None` when every region is empty.
pub fn normalize_tables(
    tables: &[PageTable],
    warnings: &mut Vec<ExtractWarning>,
) -> Option<ExtractedDataset> {
    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::new();
    let mut table_count = 0;

    for (index, table) in tables.iter().enumerate() {
        let region = index + 1;
        let Some((header_row, data_rows)) = table.rows.split_first() else {
            continue;
        };
        table_count += 1;

        if table.confidence < LOW_CONFIDENCE_THRESHOLD {
            warnings.push(
                ExtractWarning::new(WarningCode::LowConfidence, "region has ragged rows")
                    .with_page(table.page)
                    .with_region(region)
                    .with_confidence(table.confidence),
            );
        }

        let width = table.rows.iter().map(Vec::len).max().unwrap_or_default();
        let (headers, renamed) = coerce_headers(header_row, width);
        for name in renamed {
            warnings.push(
                ExtractWarning::new(
                    WarningCode::RenamedHeader,
                    format!("duplicate or reserved header stored as '{name}'"),
                )
                .with_page(table.page)
                .with_region(region),
            );
        }
        if data_rows.is_empty() {
            warnings.push(
                ExtractWarning::new(WarningCode::HeaderOnlyRegion, "region has no data rows")
                    .with_page(table.page)
                    .with_region(region),
            );
        }

        for name in &headers {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }

        records.extend(data_rows.iter().map(|row| Record {
            page: table.page,
            cells: headers
                .iter()
                .zip(row)
                .filter_map(|(name, cell)| cell.clone().map(|value| (name.clone(), value)))
                .collect::<BTreeMap<_, _>>(),
        }));
    }

    (table_count > 0).then_some(ExtractedDataset {
        columns,
        records,
        table_count,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{TableExtractor, TableSource, coerce_headers, normalize_tables};
    use crate::error::PipelineError;
    use crate::model::{PAGE_COLUMN, PageTable};
    use crate::warning::{ExtractWarning, WarningCode};

    struct FixedTables(Vec<PageTable>);

    impl TableSource for FixedTables {
        fn page_tables(
            &self,
            _document: &[u8],
            _warnings: &mut Vec<ExtractWarning>,
        ) -> Result<Vec<PageTable>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| (*cell).to_string()).collect())
            .collect()
    }

    #[test]
    fn first_row_becomes_header_and_records_keep_page() {
        let tables = vec![
            PageTable::from_strings(1, grid(&[&["Name", "Age"], &["Alice", "30"], &["Bob", "22"]])),
            PageTable::from_strings(3, grid(&[&["Name", "Age"], &["Chloé", "41"]])),
        ];

        let dataset = normalize_tables(&tables, &mut Vec::new()).expect("dataset");
        assert_eq!(dataset.columns, vec!["Name", "Age"]);
        assert_eq!(dataset.records.len(), 3);
        assert_eq!(dataset.table_count, 2);
        assert_eq!(dataset.records[2].page, 3);
        assert_eq!(dataset.records[2].get("Name"), Some("Chloé"));
    }

    #[test]
    fn record_count_is_rows_minus_one_header_per_region() {
        let tables = vec![
            PageTable::from_strings(1, grid(&[&["a"], &["1"], &["2"], &["3"]])),
            PageTable::from_strings(2, grid(&[&["b"], &["4"]])),
            PageTable::from_strings(2, grid(&[&["c"]])),
        ];
        let dataset = normalize_tables(&tables, &mut Vec::new()).expect("dataset");
        assert_eq!(dataset.records.len(), 3 + 1);
        assert!(dataset.records.iter().all(|record| record.page >= 1));
    }

    #[test]
    fn mismatched_regions_leave_gaps_instead_of_reconciling() {
        let tables = vec![
            PageTable::from_strings(1, grid(&[&["Name", "Age"], &["Alice", "30"]])),
            PageTable::from_strings(2, grid(&[&["City"], &["Lyon"]])),
        ];
        let dataset = normalize_tables(&tables, &mut Vec::new()).expect("dataset");
        assert_eq!(dataset.columns, vec!["Name", "Age", "City"]);
        assert_eq!(dataset.records[1].get("Name"), None);
        assert_eq!(dataset.records[1].get("City"), Some("Lyon"));
    }

    #[test]
    fn null_and_numeric_looking_headers_become_string_keys() {
        let table = PageTable {
            page: 1,
            rows: vec![
                vec![Some(" 2024 ".to_string()), None, Some("Total".to_string())],
                vec![Some("x".to_string()), Some("y".to_string()), None, Some("extra".to_string())],
            ],
            confidence: 1.0,
        };
        let dataset = normalize_tables(&[table], &mut Vec::new()).expect("dataset");
        assert_eq!(dataset.columns, vec!["2024", "col_2", "Total", "col_4"]);
        let record = &dataset.records[0];
        assert_eq!(record.get("col_2"), Some("y"));
        assert_eq!(record.get("Total"), None);
        assert_eq!(record.get("col_4"), Some("extra"));
    }

    #[test]
    fn duplicate_and_reserved_headers_are_suffixed() {
        let raw = vec![
            Some("Name".to_string()),
            Some("Name".to_string()),
            Some(PAGE_COLUMN.to_string()),
        ];
        let (headers, renamed) = coerce_headers(&raw, 3);
        assert_eq!(headers, vec!["Name", "Name.1", "__page__.1"]);
        assert_eq!(renamed.len(), 2);
    }

    #[test]
    fn empty_regions_are_skipped_and_all_empty_is_none() {
        let empty = PageTable {
            page: 1,
            rows: Vec::new(),
            confidence: 0.0,
        };
        assert!(normalize_tables(&[empty.clone()], &mut Vec::new()).is_none());

        let tables = vec![empty, PageTable::from_strings(2, grid(&[&["h"], &["v"]]))];
        let dataset = normalize_tables(&tables, &mut Vec::new()).expect("dataset");
        assert_eq!(dataset.table_count, 1);
    }

    #[test]
    fn header_only_region_counts_and_warns() {
        let mut warnings = Vec::new();
        let tables = vec![PageTable::from_strings(1, grid(&[&["nom", "prenom"]]))];
        let dataset = normalize_tables(&tables, &mut warnings).expect("dataset");
        assert!(dataset.records.is_empty());
        assert_eq!(dataset.columns, vec!["nom", "prenom"]);
        assert_eq!(warnings[0].code, WarningCode::HeaderOnlyRegion);
    }

    #[test]
    fn extractor_reports_no_tables_found() {
        let extractor = TableExtractor::new(FixedTables(Vec::new()));
        let error = extractor.extract(b"%PDF").expect_err("no tables");
        assert!(matches!(error, PipelineError::NoTablesFound));
    }

    #[test]
    fn extractor_report_matches_dataset() {
        let extractor = TableExtractor::new(FixedTables(vec![PageTable::from_strings(
            1,
            grid(&[&["Name"], &["Alice"], &["Bob"]]),
        )]));
        let extraction = extractor.extract(b"%PDF").expect("extraction");
        assert_eq!(extraction.report.row_count, 2);
        assert_eq!(extraction.report.table_count, 1);
    }
}
