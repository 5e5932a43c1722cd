use crate::model::{PageTable, PageText};
use crate::table_parse::{modal_width, soft_split_line_into_cells, split_line_into_cells};

pub(crate) const LOW_CONFIDENCE_THRESHOLD: f32 = 0.60;

#[allow(clippy::cast_precision_loss)]
fn region_confidence(rows: &[Vec<String>]) -> f32 {
    if rows.len() < 2 {
        return 0.0;
    }

    let modal = modal_width(rows);
    if modal == 0 {
        return 0.0;
    }

    let consistent =
        rows.iter().filter(|row| row.len() == modal).count() as f32 / rows.len() as f32;
    let max_width = rows.iter().map(Vec::len).max().unwrap_or(modal);
    let min_width = rows.iter().map(Vec::len).min().unwrap_or(modal);
    let uniformity = 1.0 - ((max_width - min_width) as f32 / max_width as f32);

    (consistent * 0.75 + uniformity * 0.25).clamp(0.0, 1.0)
}

/// Cells for one line, or `None` when the line cannot be part of a table.
fn line_cells(line: &str, min_cols: usize) -> Option<Vec<String>> {
    let cells = split_line_into_cells(line);
    if cells.len() >= min_cols {
        return Some(cells);
    }

    // Single-space layouts: accept short numeric-ish rows, never prose.
    let soft_cells = soft_split_line_into_cells(line);
    let has_numeric = soft_cells
        .iter()
        .any(|cell| cell.chars().any(|ch| ch.is_ascii_digit()));
    let looks_like_sentence = ['.', '!', '?']
        .iter()
        .any(|punctuation| line.trim_end().ends_with(*punctuation));
    if soft_cells.len() >= min_cols
        && !looks_like_sentence
        && (has_numeric || soft_cells.len() <= 6)
    {
        return Some(soft_cells);
    }

    None
}

/// Groups consecutive table-like lines of one page into regions of at least two rows.
pub(crate) fn detect_regions(page: &PageText, min_cols: usize) -> Vec<PageTable> {
    let mut regions = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    let mut close_region = |rows: &mut Vec<Vec<String>>| {
        if rows.len() >= 2 {
            let confidence = region_confidence(rows);
            let rows = std::mem::take(rows)
                .into_iter()
                .map(|row| row.into_iter().map(Some).collect())
                .collect();
            regions.push(PageTable {
                page: page.page_number,
                rows,
                confidence,
            });
        } else {
            rows.clear();
        }
    };

    for line in page.text.lines() {
        match line_cells(line, min_cols) {
            Some(cells) => current.push(cells),
            None => close_region(&mut current),
        }
    }
    close_region(&mut current);

    tracing::debug!(
        page = page.page_number,
        regions = regions.len(),
        "detected tabular regions"
    );
    regions
}

pub(crate) fn detect_all(pages: &[PageText], min_cols: usize) -> Vec<PageTable> {
    pages
        .iter()
        .flat_map(|page| detect_regions(page, min_cols.max(2)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{LOW_CONFIDENCE_THRESHOLD, detect_all, detect_regions};
    use crate::model::PageText;

    fn page(page_number: u32, text: &str) -> PageText {
        PageText {
            page_number,
            text: text.to_string(),
        }
    }

    #[test]
    fn splits_regions_on_prose_lines() {
        let text = "Name  Age\nAlice  30\nBob  22\nSome narrative sentence here.\nCity  Pop\nLyon  500\n";
        let regions = detect_regions(&page(2, text), 2);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].page, 2);
        assert_eq!(regions[0].rows.len(), 3);
        assert_eq!(
            regions[1].rows[1],
            vec![Some("Lyon".to_string()), Some("500".to_string())]
        );
    }

    #[test]
    fn single_table_line_is_not_a_region() {
        let regions = detect_regions(&page(1, "Intro paragraph.\nA  B\nClosing remark.\n"), 2);
        assert!(regions.is_empty());
    }

    #[test]
    fn ragged_region_scores_low_confidence() {
        let regions = detect_regions(&page(1, "A  B  C\n1  2\n3  4  5  6\n7  8\n"), 2);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].confidence < LOW_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn keeps_page_order_across_pages() {
        let pages = vec![page(1, "a  b\n1  2\n"), page(2, "c  d\n3  4\n")];
        let regions = detect_all(&pages, 2);
        let order = regions.iter().map(|region| region.page).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2]);
    }
}
