use std::collections::HashMap;

/// Splits a text line on tabs or runs of two or more spaces. Single spaces stay inside a cell.
pub(crate) fn split_line_into_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut pending_space = 0_usize;

    let flush = |current: &mut String, cells: &mut Vec<String>| {
        let cell = current.trim();
        if !cell.is_empty() {
            cells.push(cell.to_string());
        }
        current.clear();
    };

    for ch in line.trim().chars() {
        if ch == '\t' {
            flush(&mut current, &mut cells);
            pending_space = 0;
        } else if ch.is_whitespace() {
            pending_space += 1;
        } else {
            match pending_space {
                0 => {}
                1 => current.push(' '),
                _ => flush(&mut current, &mut cells),
            }
            pending_space = 0;
            current.push(ch);
        }
    }
    flush(&mut current, &mut cells);

    cells
}

pub(crate) fn soft_split_line_into_cells(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Most frequent row width; ties go to the wider one.
pub(crate) fn modal_width(rows: &[Vec<String>]) -> usize {
    let mut freq = HashMap::new();
    for width in rows.iter().map(Vec::len) {
        *freq.entry(width).or_insert(0_usize) += 1;
    }

    freq.into_iter()
        .max_by_key(|(width, count)| (*count, *width))
        .map_or(0, |(width, _)| width)
}
