//! CSV, Excel and JSON readers producing a typed [`Dataset`].

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use forge_core::{CellValue, Dataset};
use serde_json::Value;

use crate::error::IngestError;

/// Parse CSV bytes with a header row. Ragged rows are accepted.
pub fn read_csv(name: &str, bytes: &[u8]) -> Result<Dataset, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::malformed("csv", e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::Empty(name.to_string()));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| IngestError::malformed("csv", format!("row {}: {}", line + 1, e)))?;
        rows.push(record.iter().map(CellValue::parse).collect());
    }

    Ok(Dataset::from_rows(name, headers, rows)?)
}

/// Parse the first worksheet of an xlsx/xls workbook. Row one is the header.
pub fn read_excel(name: &str, bytes: &[u8]) -> Result<Dataset, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::malformed("excel", e))?;

    let sheet_names = workbook.sheet_names();
    let first = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| IngestError::Empty(name.to_string()))?;

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| IngestError::malformed("excel", e))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("Unnamed: {}", i),
                other => excel_cell(other).to_string().trim().to_string(),
            })
            .collect(),
        None => return Err(IngestError::Empty(name.to_string())),
    };

    let rows = rows_iter
        .map(|row| row.iter().map(excel_cell).collect())
        .collect();

    Ok(Dataset::from_rows(name, headers, rows)?)
}

fn excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) if f.is_finite() => CellValue::Number(*f),
        Data::Float(_) => CellValue::Null,
        Data::String(s) if s.trim().is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => CellValue::Text(naive.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Null,
    }
}

/// Parse JSON into rows.
///
/// A top-level array is a list of records. An object contributes its first
/// array-valued field as records, or becomes a single row when it has none.
pub fn read_json(name: &str, bytes: &[u8]) -> Result<Dataset, IngestError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| IngestError::malformed("json", e))?;

    let records: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let nested = map.iter().find_map(|(_, v)| match v {
                Value::Array(items) => Some(items.clone()),
                _ => None,
            });
            match nested {
                Some(items) => items,
                None => vec![Value::Object(map)],
            }
        }
        _ => {
            return Err(IngestError::malformed(
                "json",
                "top-level value must be an array or an object",
            ))
        }
    };

    if records.is_empty() {
        return Err(IngestError::Empty(name.to_string()));
    }

    let mut headers: Vec<String> = Vec::new();
    for record in &records {
        match record {
            Value::Object(map) => {
                for key in map.keys() {
                    if !headers.iter().any(|h| h == key) {
                        headers.push(key.clone());
                    }
                }
            }
            _ => {
                if !headers.iter().any(|h| h == "value") {
                    headers.push("value".to_string());
                }
            }
        }
    }
    if headers.is_empty() {
        return Err(IngestError::Empty(name.to_string()));
    }

    let rows = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| match record {
                    Value::Object(map) => map.get(h).map(json_cell).unwrap_or(CellValue::Null),
                    scalar if h == "value" => json_cell(scalar),
                    _ => CellValue::Null,
                })
                .collect()
        })
        .collect();

    Ok(Dataset::from_rows(name, headers, rows)?)
}

fn json_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Null),
        Value::String(s) => CellValue::Text(s.clone()),
        nested => CellValue::Text(nested.to_string()),
    }
}
