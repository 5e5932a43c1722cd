use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::extract::{Extraction, TableExtractor, TableSource};
use crate::mapping::{ColumnMapping, MappingChoice, build_default_mapping, set_mapping};
use crate::materialize::{FinalTable, check_ready, materialize};
use crate::model::ExtractedDataset;
use crate::options::ExportOptions;
use crate::schema::TargetSchema;
use crate::xlsx_out::serialize;

/// Hex SHA-256 of an uploaded document; identifies it for memoized extraction.
#[must_use]
pub fn document_digest(document: &[u8]) -> String {
    format!("{:x}", Sha256::digest(document))
}

/// Everything one interaction needs, replaced wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineState {
    schema: TargetSchema,
    dataset: Option<Arc<ExtractedDataset>>,
    mapping: ColumnMapping,
}

impl PipelineState {
    #[must_use]
    pub fn schema(&self) -> &TargetSchema {
        &self.schema
    }

    #[must_use]
    pub fn dataset(&self) -> Option<&ExtractedDataset> {
        self.dataset.as_deref()
    }

    #[must_use]
    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    fn source_columns(&self) -> &[String] {
        match self.dataset.as_deref() {
            Some(dataset) => dataset.source_columns(),
            None => &[],
        }
    }

    #[must_use]
    pub fn with_schema(self, schema: TargetSchema) -> Self {
        let mapping = build_default_mapping(&schema, self.source_columns());
        Self {
            schema,
            mapping,
            ..self
        }
    }

    #[must_use]
    pub fn with_dataset(self, dataset: Option<Arc<ExtractedDataset>>) -> Self {
        let source_columns = dataset
            .as_deref()
            .map(|dataset| dataset.columns.clone())
            .unwrap_or_default();
        let mapping = build_default_mapping(&self.schema, &source_columns);
        Self {
            dataset,
            mapping,
            ..self
        }
    }

    /// # Errors
    ///
    /// `UnknownTargetColumn` when `target` is not in the schema.
    pub fn with_choice(self, target: &str, choice: MappingChoice) -> Result<Self, PipelineError> {
        let mapping = set_mapping(&self.mapping, target, choice)?;
        Ok(Self { mapping, ..self })
    }

    /// # Errors
    ///
    /// `IncompleteConfiguration` while the export control should stay unavailable.
    pub fn readiness(&self) -> Result<(), PipelineError> {
        check_ready(&self.schema, self.dataset.as_deref(), &self.mapping)
    }

    /// # Errors
    ///
    /// Same as [`PipelineState::readiness`].
    pub fn final_table(&self) -> Result<FinalTable, PipelineError> {
        self.readiness()?;
        let dataset = self
            .dataset
            .as_deref()
            .ok_or_else(|| PipelineError::IncompleteConfiguration("no dataset".to_string()))?;
        Ok(materialize(&self.schema, &self.mapping, dataset))
    }

    /// # Errors
    ///
    /// Readiness failures, or a spreadsheet encoder failure.
    pub fn export(&self, options: &ExportOptions) -> Result<Vec<u8>, PipelineError> {
        serialize(&self.final_table()?, options)
    }
}

/// Extraction results per document digest, so mapping edits never re-run extraction.
#[derive(Debug, Default)]
pub struct ExtractionMemo {
    entries: HashMap<String, Arc<Extraction>>,
}

impl ExtractionMemo {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Failed extractions are not memoized; the host re-submits after the user fixes input.
    ///
    /// # Errors
    ///
    /// Whatever the extractor reports for this document.
    pub fn get_or_extract<S: TableSource>(
        &mut self,
        extractor: &TableExtractor<S>,
        document: &[u8],
    ) -> Result<Arc<Extraction>, PipelineError> {
        let digest = document_digest(document);
        if let Some(hit) = self.entries.get(&digest) {
            tracing::debug!(%digest, "extraction memo hit");
            return Ok(Arc::clone(hit));
        }

        let extraction = Arc::new(extractor.extract(document)?);
        self.entries.insert(digest, Arc::clone(&extraction));
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::{ExtractionMemo, PipelineState, document_digest};
    use crate::error::PipelineError;
    use crate::extract::{TableExtractor, TableSource};
    use crate::mapping::MappingChoice;
    use crate::model::PageTable;
    use crate::schema::parse_manual_columns;
    use crate::warning::ExtractWarning;

    struct CountingSource {
        calls: Rc<Cell<usize>>,
    }

    impl TableSource for CountingSource {
        fn page_tables(
            &self,
            _document: &[u8],
            _warnings: &mut Vec<ExtractWarning>,
        ) -> Result<Vec<PageTable>, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![PageTable::from_strings(
                1,
                vec![
                    vec!["Name".to_string(), "City".to_string()],
                    vec!["Alice".to_string(), "Lyon".to_string()],
                    vec!["Bob".to_string(), "Nantes".to_string()],
                ],
            )])
        }
    }

    fn extractor() -> TableExtractor<CountingSource> {
        counted_extractor().0
    }

    fn counted_extractor() -> (TableExtractor<CountingSource>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let extractor = TableExtractor::new(CountingSource {
            calls: Rc::clone(&calls),
        });
        (extractor, calls)
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = document_digest(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn memo_extracts_each_document_once() {
        let extractor = extractor();
        let mut memo = ExtractionMemo::default();

        let first = memo.get_or_extract(&extractor, b"doc-1").expect("extract");
        let second = memo.get_or_extract(&extractor, b"doc-1").expect("extract");
        memo.get_or_extract(&extractor, b"doc-2").expect("extract");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(memo.len(), 2);
    }

    #[test]
    fn memo_does_not_re_run_extraction_on_hit() {
        let (extractor, calls) = counted_extractor();
        let mut memo = ExtractionMemo::default();
        memo.get_or_extract(&extractor, b"same").expect("extract");
        memo.get_or_extract(&extractor, b"same").expect("extract");
        assert_eq!(memo.len(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn state_flows_from_schema_to_export_table() {
        let extraction = extractor().extract(b"doc").expect("extract");
        let state = PipelineState::default()
            .with_schema(parse_manual_columns("Name,ville"))
            .with_dataset(Some(Arc::new(extraction.dataset)));
        assert_eq!(state.mapping().get("Name"), Some("Name"));
        assert_eq!(state.mapping().get("ville"), None);

        let state = state
            .with_choice("ville", MappingChoice::Source("City".to_string()))
            .expect("known target");
        let table = state.final_table().expect("ready");
        assert_eq!(table.rows, vec![vec!["Alice", "Lyon"], vec!["Bob", "Nantes"]]);
    }

    #[test]
    fn empty_schema_blocks_export() {
        let extraction = extractor().extract(b"doc").expect("extract");
        let state = PipelineState::default().with_dataset(Some(Arc::new(extraction.dataset)));
        assert!(matches!(
            state.export(&crate::options::ExportOptions::default()),
            Err(PipelineError::IncompleteConfiguration(_))
        ));
    }

    #[test]
    fn replacing_dataset_rebuilds_default_mapping() {
        let state = PipelineState::default()
            .with_schema(parse_manual_columns("Name"))
            .with_choice("Name", MappingChoice::Unset)
            .expect("known target");
        let extraction = extractor().extract(b"doc").expect("extract");
        let state = state.with_dataset(Some(Arc::new(extraction.dataset)));
        assert_eq!(state.mapping().get("Name"), Some("Name"));
    }
}
