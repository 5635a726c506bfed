//! Result formatting for the front ends
//!
//! ASCII tables for humans and JSON for scripts.

use indexmap::IndexMap;

use crate::engine::Row;

/// Rows shown for a statement result or preview in table mode
pub const MAX_DISPLAY_ROWS: usize = 50;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Render cells as an ASCII table
pub fn format_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() && rows.is_empty() {
        return String::new();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in rows {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }

    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output
}

/// Render engine rows as a table, truncated to [`MAX_DISPLAY_ROWS`]
pub fn format_rows(columns: &[String], rows: &[Row]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .take(MAX_DISPLAY_ROWS)
        .map(|row| row.values().iter().map(|v| v.to_string()).collect())
        .collect();

    let mut output = format_table(columns, &cells);
    if rows.len() > MAX_DISPLAY_ROWS {
        output.push_str(&format!(
            "{} row(s) returned, showing first {}\n",
            rows.len(),
            MAX_DISPLAY_ROWS
        ));
    } else {
        output.push_str(&format!("{} row(s) returned\n", rows.len()));
    }
    output
}

/// Engine rows as JSON objects keyed by column name, in column order
pub fn rows_to_json(columns: &[String], rows: &[Row]) -> Vec<IndexMap<String, serde_json::Value>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.values().iter().map(|v| v.to_json()))
                .collect()
        })
        .collect()
}

/// Render an optional cell, NULL when absent
pub fn cell<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}
