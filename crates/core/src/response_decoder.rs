use serde_json::{Map, Value};
use tracing::debug;

pub type Row = Map<String, Value>;

pub const TEXT_RESPONSE_TYPE: &str = "text_response";
const SCALAR_COLUMN: &str = "value";
const FENCE: &str = "```";
const MIN_TABLE_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Array(Vec<Value>),
    Object(Row),
    Text(String),
    Absent,
}

impl Payload {
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::Array(values) => Self::Array(values),
            Value::Object(object) => Self::Object(object),
            Value::String(text) => Self::Text(text),
            scalar @ (Value::Bool(_) | Value::Number(_)) => Self::Text(scalar.to_string()),
        }
    }

    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Array(values) => Value::Array(values.clone()).to_string(),
            Self::Object(object) => Value::Object(object.clone()).to_string(),
            Self::Absent => String::new(),
        }
    }
}

impl From<Option<Value>> for Payload {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::from_json)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextRule {
    pub name: &'static str,
    pub applies: fn(&str) -> bool,
    pub decode: fn(&str) -> Option<Vec<Row>>,
}

/// Structured-text recognizers in priority order. A rule that applies but cannot decode
/// hands over to the next one; the prose fallback sits behind all of them.
pub const TEXT_RULES: [TextRule; 2] = [
    TextRule {
        name: "markdown_table",
        applies: looks_like_markdown_table,
        decode: decode_markdown_table,
    },
    TextRule {
        name: "fenced_json",
        applies: has_fenced_block,
        decode: decode_fenced_json,
    },
];

#[must_use]
pub fn decode(payload: Payload) -> Vec<Row> {
    match payload {
        Payload::Array(values) => rows_from_values(values),
        Payload::Object(object) => vec![object],
        Payload::Text(text) => decode_text(&text),
        Payload::Absent => Vec::new(),
    }
}

#[must_use]
pub fn decode_text(text: &str) -> Vec<Row> {
    for rule in &TEXT_RULES {
        if !(rule.applies)(text) {
            continue;
        }
        if let Some(rows) = (rule.decode)(text) {
            debug!(rule = rule.name, rows = rows.len(), "decoded agent response");
            return rows;
        }
        debug!(rule = rule.name, "rule matched but could not decode, falling through");
    }

    vec![text_response_row(text)]
}

#[must_use]
pub fn text_response_row(text: &str) -> Row {
    let mut row = Row::with_capacity(2);
    row.insert("content".to_string(), Value::String(text.to_string()));
    row.insert(
        "type".to_string(),
        Value::String(TEXT_RESPONSE_TYPE.to_string()),
    );
    row
}

fn rows_from_values(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row_from_value).collect()
}

fn row_from_value(value: Value) -> Row {
    match value {
        Value::Object(object) => object,
        other => {
            let mut row = Row::with_capacity(1);
            row.insert(SCALAR_COLUMN.to_string(), other);
            row
        }
    }
}

fn normalize_json(value: Value) -> Vec<Row> {
    match value {
        Value::Array(values) => rows_from_values(values),
        other => vec![row_from_value(other)],
    }
}

fn looks_like_markdown_table(text: &str) -> bool {
    text.contains('|') && text.lines().any(is_separator_line)
}

// A pipe-delimited line with a literal `-|-`, as in `|---|---|`. Spaced separators such as
// `| --- | --- |` do not qualify.
fn is_separator_line(line: &str) -> bool {
    line.contains('|') && line.contains("-|-")
}

fn split_cells(line: &str) -> Vec<&str> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect()
}

fn decode_markdown_table(text: &str) -> Option<Vec<Row>> {
    let lines = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    if lines.len() < MIN_TABLE_LINES {
        return None;
    }

    let separator_index = lines.iter().position(|line| is_separator_line(line))?;
    let header_line = lines.get(separator_index.checked_sub(1)?)?;
    let headers = split_cells(header_line);
    if headers.is_empty() {
        return None;
    }

    let rows = lines[separator_index + 1..]
        .iter()
        .map(|line| {
            let cells = split_cells(line);
            let mut row = Row::with_capacity(headers.len());
            for (index, header) in headers.iter().enumerate() {
                let cell = cells.get(index).copied().unwrap_or("");
                row.insert((*header).to_string(), Value::String(cell.to_string()));
            }
            row
        })
        .collect();
    Some(rows)
}

fn has_fenced_block(text: &str) -> bool {
    fenced_blocks(text).next().is_some()
}

fn decode_fenced_json(text: &str) -> Option<Vec<Row>> {
    fenced_blocks(text)
        .find_map(|body| serde_json::from_str::<Value>(body).ok())
        .map(normalize_json)
}

fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find(FENCE)?;
        let after_open = &rest[start + FENCE.len()..];
        let end = after_open.find(FENCE)?;
        let inner = &after_open[..end];
        rest = &after_open[end + FENCE.len()..];
        Some(inner.strip_prefix("json").unwrap_or(inner).trim())
    })
}
