use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Reserved column carrying the 1-based page a record came from.
///
/// Only used when a dataset is flattened into a table; it is never offered as a source column.
/// A real header spelled the same way is renamed during extraction.
pub const PAGE_COLUMN: &str = "__page__";

/// A raw cell as handed over by the extraction collaborator: text or nothing.
pub type RawCell = Option<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// One tabular region detected on a page. Row 0 is the region's header.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTable {
    pub page: u32,
    pub rows: Vec<Vec<RawCell>>,
    pub confidence: f32,
}

impl PageTable {
    #[must_use]
    pub fn from_strings(page: u32, rows: Vec<Vec<String>>) -> Self {
        Self {
            page,
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Some).collect())
                .collect(),
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub page: u32,
    pub cells: BTreeMap<String, String>,
}

impl Record {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDataset {
    /// Union of header names, first-seen order.
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    pub table_count: usize,
}

impl ExtractedDataset {
    #[must_use]
    pub fn source_columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|candidate| candidate == column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flattens the dataset to a header row plus string rows, provenance first.
    #[must_use]
    pub fn to_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut headers = Vec::with_capacity(self.columns.len() + 1);
        headers.push(PAGE_COLUMN.to_string());
        headers.extend(self.columns.iter().cloned());

        let rows = self
            .records
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(headers.len());
                row.push(record.page.to_string());
                row.extend(
                    self.columns
                        .iter()
                        .map(|column| record.get(column).unwrap_or_default().to_string()),
                );
                row
            })
            .collect();

        (headers, rows)
    }
}
