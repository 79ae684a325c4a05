use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ForgeError, Result};

// =============================================================================
// Tabular data
// =============================================================================

/// Inferred type of a dataset column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Boolean,
    DateTime,
    Categorical,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Categorical => "categorical",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Tokens treated as missing when parsing raw text cells.
const NULL_TOKENS: &[&str] = &[
    "", "na", "n/a", "nan", "null", "none", "#n/a", "<na>", "-nan",
];

impl CellValue {
    /// Interpret a raw text cell (CSV field, spreadsheet string).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if NULL_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
            return CellValue::Null;
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => CellValue::Bool(true),
            "false" => CellValue::Bool(false),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a date or date-time string in the formats commonly found in
/// business exports. Bare numbers never parse.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.len() < 6 || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %b %Y", "%b %d, %Y", "%B %d, %Y", "%Y%m%d",
    ];
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// A named, typed column of cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    values: Vec<CellValue>,
}

impl Column {
    /// Build a column and infer its type from the cells.
    ///
    /// Columns mixing numbers, booleans and text become categorical with every
    /// non-null value rendered as text.
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        let mut saw_number = false;
        let mut saw_bool = false;
        let mut saw_text = false;
        let mut all_dates = true;

        for value in &values {
            match value {
                CellValue::Null => {}
                CellValue::Number(_) => saw_number = true,
                CellValue::Bool(_) => saw_bool = true,
                CellValue::Text(s) => {
                    saw_text = true;
                    if all_dates && parse_datetime(s).is_none() {
                        all_dates = false;
                    }
                }
            }
        }

        let column_type = match (saw_number, saw_bool, saw_text) {
            (true, false, false) => ColumnType::Numeric,
            (false, true, false) => ColumnType::Boolean,
            (false, false, true) if all_dates => ColumnType::DateTime,
            _ => ColumnType::Categorical,
        };

        let values = if column_type == ColumnType::Categorical && (saw_number || saw_bool) {
            values
                .into_iter()
                .map(|v| match v {
                    CellValue::Null | CellValue::Text(_) => v,
                    other => CellValue::Text(other.to_string()),
                })
                .collect()
        } else {
            values
        };

        Self {
            name: name.into(),
            column_type,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn get(&self, row: usize) -> Option<&CellValue> {
        self.values.get(row)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub fn non_null_count(&self) -> usize {
        self.values.len() - self.null_count()
    }

    /// Non-null numeric values in row order.
    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().filter_map(CellValue::as_f64).collect()
    }

    /// Count of distinct non-null values.
    pub fn unique_count(&self) -> usize {
        self.value_counts().len()
    }

    /// Non-null value frequencies, most frequent first.
    ///
    /// Ties keep the order in which values first appear.
    pub fn value_counts(&self) -> Vec<(String, usize)> {
        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for value in self.values.iter().filter(|v| !v.is_null()) {
            let key = value.to_string();
            let entry = counts.entry(key.clone()).or_insert(0);
            if *entry == 0 {
                order.push(key);
            }
            *entry += 1;
        }
        let mut result: Vec<(String, usize)> = order
            .into_iter()
            .map(|k| {
                let c = counts.get(&k).copied().unwrap_or(0);
                (k, c)
            })
            .collect();
        result.sort_by(|a, b| b.1.cmp(&a.1));
        result
    }
}

/// Tabular rows with named typed columns.
///
/// Created once at ingestion and read-only afterwards. Storage is columnar;
/// every column has exactly `row_count` cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dataset {
    name: String,
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Assemble a dataset from prepared columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(ForgeError::Ingest(format!(
                "column '{}' has {} rows, expected {}",
                bad.name(),
                bad.len(),
                row_count
            )));
        }
        Ok(Self {
            name: name.into(),
            columns,
            row_count,
        })
    }

    /// Build a dataset from row-major cells.
    ///
    /// Short rows are padded with nulls. Rows wider than the header get
    /// `Unnamed: N` columns. Duplicate header names are suffixed `.1`, `.2`.
    pub fn from_rows(
        name: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<Self> {
        let width = rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(headers.len());

        let mut names = headers;
        for i in names.len()..width {
            names.push(format!("Unnamed: {}", i));
        }
        let names = dedupe_names(names);

        let mut columns: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); width];
        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.push(cells.next().unwrap_or(CellValue::Null));
            }
        }

        let columns = names
            .into_iter()
            .zip(columns)
            .map(|(n, v)| Column::new(n, v))
            .collect();
        Self::new(name, columns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Columns of the given type in dataset order.
    pub fn columns_of_type(&self, column_type: ColumnType) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| c.column_type() == column_type)
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<&Column> {
        self.columns_of_type(ColumnType::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<&Column> {
        self.columns_of_type(ColumnType::Categorical)
    }

    pub fn datetime_columns(&self) -> Vec<&Column> {
        self.columns_of_type(ColumnType::DateTime)
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&CellValue>> {
        if index >= self.row_count {
            return None;
        }
        Some(self.columns.iter().filter_map(|c| c.get(index)).collect())
    }

    /// Total number of null cells.
    pub fn missing_total(&self) -> usize {
        self.columns.iter().map(Column::null_count).sum()
    }
}

fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let out = if *count == 0 {
                name.clone()
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            out
        })
        .collect()
}

// =============================================================================
// Retrieval
// =============================================================================

/// Origin of an indexed chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Text rendered from a tabular dataset.
    TabularData,
    /// Raw document text (PDF, DOCX, TXT).
    Document,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TabularData => "tabular_data",
            SourceKind::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tabular_data" => Some(SourceKind::TabularData),
            "document" => Some(SourceKind::Document),
            _ => None,
        }
    }
}

/// A bounded span of source text, the unit of retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    /// Position of this chunk in its source, starting at zero.
    pub index: usize,
    pub text: String,
    /// Character offset of the first character (inclusive).
    pub start: usize,
    /// Character offset after the last character (exclusive).
    pub end: usize,
    /// File name or label the chunk came from.
    pub source: String,
    pub kind: SourceKind,
}

/// Embedding vector for one chunk. All vectors in an index share a dimension.
pub type EmbeddingVector = Vec<f32>;

/// A chunk together with its embedding, as persisted and restored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: DocumentChunk,
    pub embedding: EmbeddingVector,
}

// =============================================================================
// Analysis
// =============================================================================

/// What produced an analysis result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Overview,
    Question,
    Custom,
    ChartSuggestions,
    Chat,
    Image,
}

/// Labeled section of a structured model response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Trends,
    Anomalies,
    Recommendations,
    Kpis,
    /// Unparsed response text, used when no section markers are found.
    Fallback,
}

impl SectionKind {
    /// Canonical heading requested in prompts.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::Summary => "Executive Summary",
            SectionKind::Trends => "Key Trends & Patterns",
            SectionKind::Anomalies => "Anomalies & Concerns",
            SectionKind::Recommendations => "Actionable Recommendations",
            SectionKind::Kpis => "KPIs to Monitor",
            SectionKind::Fallback => "Response",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub body: String,
}

impl Section {
    pub fn new(kind: SectionKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            body: body.into(),
        }
    }
}

/// Structured text produced for one analysis request. Session-scoped only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub sections: Vec<Section>,
    /// Model output exactly as received.
    pub raw: String,
    /// True when the response could not be split into labeled sections.
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(kind: AnalysisKind, sections: Vec<Section>, raw: impl Into<String>) -> Self {
        let fallback = sections.iter().all(|s| s.kind == SectionKind::Fallback);
        Self {
            id: Uuid::new_v4(),
            kind,
            sections,
            raw: raw.into(),
            fallback,
            created_at: Utc::now(),
        }
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Render the sections back to markdown for display or chat history.
    pub fn to_markdown(&self) -> String {
        if self.fallback {
            return self
                .sections
                .iter()
                .map(|s| s.body.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
        }
        self.sections
            .iter()
            .map(|s| format!("## {}\n\n{}", s.title, s.body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Speaker of a chat turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_cell_parse() {
        assert_eq!(CellValue::parse("42"), CellValue::Number(42.0));
        assert_eq!(CellValue::parse(" -3.5 "), CellValue::Number(-3.5));
        assert_eq!(CellValue::parse("NA"), CellValue::Null);
        assert_eq!(CellValue::parse(""), CellValue::Null);
        assert_eq!(CellValue::parse("nan"), CellValue::Null);
        assert_eq!(CellValue::parse("True"), CellValue::Bool(true));
        assert_eq!(CellValue::parse("inf"), text("inf"));
        assert_eq!(CellValue::parse("Europe"), text("Europe"));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn test_cell_json_untagged() {
        let cells: Vec<CellValue> = serde_json::from_str(r#"[null, true, 1.5, "x"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Null,
                CellValue::Bool(true),
                CellValue::Number(1.5),
                text("x")
            ]
        );
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2024-01-31").is_some());
        assert!(parse_datetime("2024-01-31 10:15:00").is_some());
        assert!(parse_datetime("2024-01-31T10:15:00Z").is_some());
        assert!(parse_datetime("01/31/2024").is_some());
        assert!(parse_datetime("2024").is_none());
        assert!(parse_datetime("Europe").is_none());
    }

    #[test]
    fn test_column_type_inference() {
        let numeric = Column::new("n", vec![CellValue::Number(1.0), CellValue::Null]);
        assert_eq!(numeric.column_type(), ColumnType::Numeric);

        let boolean = Column::new("b", vec![CellValue::Bool(true), CellValue::Bool(false)]);
        assert_eq!(boolean.column_type(), ColumnType::Boolean);

        let dates = Column::new("d", vec![text("2024-01-01"), text("2024-02-01")]);
        assert_eq!(dates.column_type(), ColumnType::DateTime);

        let all_null = Column::new("z", vec![CellValue::Null, CellValue::Null]);
        assert_eq!(all_null.column_type(), ColumnType::Categorical);
    }

    #[test]
    fn test_mixed_column_becomes_text() {
        let col = Column::new("m", vec![CellValue::Number(1.0), text("a"), CellValue::Null]);
        assert_eq!(col.column_type(), ColumnType::Categorical);
        assert_eq!(col.values()[0], text("1"));
        assert_eq!(col.values()[2], CellValue::Null);
    }

    #[test]
    fn test_value_counts_order() {
        let col = Column::new(
            "c",
            vec![text("b"), text("a"), text("a"), text("c"), text("b"), CellValue::Null],
        );
        let counts = col.value_counts();
        assert_eq!(
            counts,
            vec![
                ("b".to_string(), 2),
                ("a".to_string(), 2),
                ("c".to_string(), 1)
            ]
        );
        assert_eq!(col.unique_count(), 3);
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn test_dataset_from_rows_pads_and_dedupes() {
        let ds = Dataset::from_rows(
            "t",
            vec!["a".into(), "a".into()],
            vec![
                vec![CellValue::Number(1.0)],
                vec![CellValue::Number(2.0), text("x"), text("y")],
            ],
        )
        .unwrap();
        assert_eq!(ds.column_names(), vec!["a", "a.1", "Unnamed: 2"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("a.1").unwrap().get(0), Some(&CellValue::Null));
        assert_eq!(ds.missing_total(), 2);
    }

    #[test]
    fn test_dataset_rejects_ragged_columns() {
        let result = Dataset::new(
            "t",
            vec![
                Column::new("a", vec![CellValue::Number(1.0)]),
                Column::new("b", vec![]),
            ],
        );
        assert!(matches!(result, Err(ForgeError::Ingest(_))));
    }

    #[test]
    fn test_dataset_row_access() {
        let ds = Dataset::from_rows(
            "t",
            vec!["x".into(), "y".into()],
            vec![vec![CellValue::Number(1.0), text("a")]],
        )
        .unwrap();
        let row = ds.row(0).unwrap();
        assert_eq!(row.len(), 2);
        assert!(ds.row(1).is_none());
        assert_eq!(ds.numeric_columns().len(), 1);
        assert_eq!(ds.categorical_columns().len(), 1);
    }

    #[test]
    fn test_analysis_result_fallback_flag() {
        let parsed = AnalysisResult::new(
            AnalysisKind::Overview,
            vec![
                Section::new(SectionKind::Summary, "s"),
                Section::new(SectionKind::Trends, "t"),
            ],
            "raw",
        );
        assert!(!parsed.fallback);
        assert_eq!(parsed.section(SectionKind::Trends).unwrap().body, "t");
        assert!(parsed.to_markdown().starts_with("## Executive Summary"));

        let fallback = AnalysisResult::new(
            AnalysisKind::Question,
            vec![Section::new(SectionKind::Fallback, "plain answer")],
            "plain answer",
        );
        assert!(fallback.fallback);
        assert_eq!(fallback.to_markdown(), "plain answer");
    }

    #[test]
    fn test_source_kind_roundtrip_str() {
        for kind in [SourceKind::TabularData, SourceKind::Document] {
            assert_eq!(SourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::parse("other"), None);
    }
}
