//! File classification and the unified loader entry points.

use std::path::Path;

use forge_core::Dataset;
use tracing::{debug, info};

use crate::document;
use crate::error::IngestError;
use crate::tabular;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Excel,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

/// How a file is ingested, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Tabular(TabularFormat),
    Document(DocumentFormat),
    Image,
}

impl FileKind {
    /// Classify a file name by extension.
    pub fn detect(file_name: &str) -> Result<Self, IngestError> {
        let ext = file_extension(file_name);
        match ext.as_str() {
            "csv" => Ok(FileKind::Tabular(TabularFormat::Csv)),
            "xlsx" | "xls" => Ok(FileKind::Tabular(TabularFormat::Excel)),
            "json" => Ok(FileKind::Tabular(TabularFormat::Json)),
            "pdf" => Ok(FileKind::Document(DocumentFormat::Pdf)),
            "docx" => Ok(FileKind::Document(DocumentFormat::Docx)),
            "txt" => Ok(FileKind::Document(DocumentFormat::Text)),
            "png" | "jpg" | "jpeg" => Ok(FileKind::Image),
            _ => Err(IngestError::UnsupportedFormat(if ext.is_empty() {
                file_name.to_string()
            } else {
                ext
            })),
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, FileKind::Tabular(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self, FileKind::Document(_))
    }

    /// Short label used in listings and status responses.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Tabular(_) => "tabular",
            FileKind::Document(_) => "document",
            FileKind::Image => "image",
        }
    }
}

/// Lower-case extension without the dot, or an empty string.
pub fn file_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() || !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Parsed content of an uploaded file.
#[derive(Debug, Clone)]
pub enum LoadedContent {
    Tabular(Dataset),
    Document(String),
    Image(Vec<u8>),
}

impl LoadedContent {
    pub fn kind_label(&self) -> &'static str {
        match self {
            LoadedContent::Tabular(_) => "tabular",
            LoadedContent::Document(_) => "document",
            LoadedContent::Image(_) => "image",
        }
    }
}

/// Parse file bytes according to the file name's extension.
///
/// Corrupt input yields [`IngestError::Malformed`]; this never panics.
pub fn load_bytes(file_name: &str, bytes: &[u8]) -> Result<LoadedContent, IngestError> {
    let kind = FileKind::detect(file_name)?;
    if bytes.is_empty() {
        return Err(IngestError::Empty(file_name.to_string()));
    }
    debug!(file = file_name, kind = kind.label(), size = bytes.len(), "Loading file");

    let content = match kind {
        FileKind::Tabular(TabularFormat::Csv) => {
            LoadedContent::Tabular(tabular::read_csv(file_name, bytes)?)
        }
        FileKind::Tabular(TabularFormat::Excel) => {
            LoadedContent::Tabular(tabular::read_excel(file_name, bytes)?)
        }
        FileKind::Tabular(TabularFormat::Json) => {
            LoadedContent::Tabular(tabular::read_json(file_name, bytes)?)
        }
        FileKind::Document(DocumentFormat::Pdf) => {
            LoadedContent::Document(document::read_pdf(bytes)?)
        }
        FileKind::Document(DocumentFormat::Docx) => {
            LoadedContent::Document(document::read_docx(bytes)?)
        }
        FileKind::Document(DocumentFormat::Text) => {
            LoadedContent::Document(document::read_text(bytes)?)
        }
        FileKind::Image => LoadedContent::Image(bytes.to_vec()),
    };

    match &content {
        LoadedContent::Tabular(ds) => info!(
            file = file_name,
            rows = ds.row_count(),
            columns = ds.column_count(),
            "Dataset loaded"
        ),
        LoadedContent::Document(text) => {
            info!(file = file_name, chars = text.chars().count(), "Document loaded")
        }
        LoadedContent::Image(bytes) => info!(file = file_name, size = bytes.len(), "Image loaded"),
    }

    Ok(content)
}

/// Read a file from disk and parse it.
pub fn load_path(path: &Path) -> Result<LoadedContent, IngestError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IngestError::InvalidFileName(path.display().to_string()))?;
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IngestError::NotFound(path.display().to_string()),
        _ => IngestError::Io(e),
    })?;
    load_bytes(file_name, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("sales.CSV"), "csv");
        assert_eq!(file_extension("report.final.docx"), "docx");
        assert_eq!(file_extension("README"), "");
    }

    #[test]
    fn test_detect_kinds() {
        assert_eq!(
            FileKind::detect("a.xls").unwrap(),
            FileKind::Tabular(TabularFormat::Excel)
        );
        assert_eq!(
            FileKind::detect("a.txt").unwrap(),
            FileKind::Document(DocumentFormat::Text)
        );
        assert_eq!(FileKind::detect("chart.JPEG").unwrap(), FileKind::Image);
        assert!(matches!(
            FileKind::detect("tool.exe"),
            Err(IngestError::UnsupportedFormat(ext)) if ext == "exe"
        ));
    }

    #[test]
    fn test_load_bytes_rejects_empty() {
        assert!(matches!(
            load_bytes("a.csv", b""),
            Err(IngestError::Empty(_))
        ));
    }

    #[test]
    fn test_load_bytes_dispatches_csv_and_text() {
        match load_bytes("a.csv", b"x,y\n1,2\n").unwrap() {
            LoadedContent::Tabular(ds) => assert_eq!(ds.row_count(), 1),
            other => panic!("expected tabular, got {}", other.kind_label()),
        }
        match load_bytes("notes.txt", b"hello").unwrap() {
            LoadedContent::Document(text) => assert_eq!(text, "hello"),
            other => panic!("expected document, got {}", other.kind_label()),
        }
    }

    #[test]
    fn test_load_path_missing_file() {
        let result = load_path(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(IngestError::NotFound(_))));
    }

    #[test]
    fn test_load_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        match load_path(&path).unwrap() {
            LoadedContent::Tabular(ds) => assert_eq!(ds.row_count(), 2),
            other => panic!("expected tabular, got {}", other.kind_label()),
        }
    }
}
