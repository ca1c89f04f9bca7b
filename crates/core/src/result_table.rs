use serde_json::Value;

use crate::database_kind::DatabaseKind;
use crate::response_decoder::Row;

const NULL_CELL: &str = "null";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub sql: String,
    pub rows: Vec<Row>,
    pub execution_time_ms: f64,
    pub database_kind: DatabaseKind,
}

impl QueryResult {
    /// Column headers, taken from the first row only. Keys that appear only in later rows
    /// are not displayed; rows missing a key render an empty cell.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn visible_rows(&self, start: usize, limit: usize) -> &[Row] {
        if limit == 0 || start >= self.rows.len() {
            return &[];
        }

        let end = start.saturating_add(limit).min(self.rows.len());
        &self.rows[start..end]
    }

    #[must_use]
    pub fn cell_values(&self, row: &Row) -> Vec<String> {
        self.columns()
            .into_iter()
            .map(|column| cell_text(row.get(column)))
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} Query Results: {} rows, {} columns",
            self.database_kind.display_name(),
            self.row_count(),
            self.columns().len()
        )
    }

    #[must_use]
    pub fn render_text_table(&self) -> String {
        let columns = self.columns();
        if columns.is_empty() {
            return String::new();
        }

        let body = self
            .rows
            .iter()
            .map(|row| self.cell_values(row))
            .collect::<Vec<_>>();
        let mut widths = columns
            .iter()
            .map(|column| column.chars().count())
            .collect::<Vec<_>>();
        for values in &body {
            for (width, value) in widths.iter_mut().zip(values) {
                *width = (*width).max(value.chars().count());
            }
        }

        let header = columns
            .iter()
            .map(|column| (*column).to_string())
            .collect::<Vec<_>>();
        let mut lines = Vec::with_capacity(body.len() + 2);
        lines.push(render_line(&header, &widths));
        lines.push(
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for values in &body {
            lines.push(render_line(values, &widths));
        }
        lines.join("\n")
    }
}

#[must_use]
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Null) => NULL_CELL.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => nested.to_string(),
    }
}

#[must_use]
pub fn format_execution_time(execution_time_ms: f64) -> String {
    format!("{execution_time_ms}ms")
}

fn render_line(values: &[String], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}
