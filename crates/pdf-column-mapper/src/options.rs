use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};

pub const DEFAULT_SHEET_NAME: &str = "Données";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    spans: Vec<RangeInclusive<u32>>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.spans.iter().any(|span| span.contains(&page))
    }
}

fn page_number(raw: &str) -> Result<u32, String> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err("page numbers start at 1".to_string()),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("'{}' is not a page number", raw.trim())),
    }
}

/// `"4"` or `"2-5"`.
fn page_span(token: &str) -> Result<RangeInclusive<u32>, String> {
    let Some((first, last)) = token.split_once('-') else {
        let page = page_number(token)?;
        return Ok(page..=page);
    };
    let (first, last) = (page_number(first)?, page_number(last)?);
    if last < first {
        return Err(format!("range '{token}' runs backwards"));
    }
    Ok(first..=last)
}

impl FromStr for PageSelection {
    type Err = String;

    /// Comma-separated pages and inclusive ranges, e.g. `1-3,5`.
    fn from_str(selection: &str) -> Result<Self, Self::Err> {
        let spans = selection
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(page_span)
            .collect::<Result<Vec<_>, _>>()?;
        if spans.is_empty() {
            return Err("select at least one page".to_string());
        }
        Ok(Self { spans })
    }
}

/// Knobs for the text-layout table source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    /// Minimum cells a line needs to count as a table row.
    pub min_cols: usize,
    /// Retry detection on whole-document text when no page yields a region.
    pub document_fallback: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            min_cols: 2,
            document_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub sheet_name: String,
    /// Written to the workbook properties when set. Left out otherwise so output is reproducible.
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            created_at: None,
        }
    }
}
