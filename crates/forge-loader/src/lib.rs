//! InsightForge data loader.
//!
//! Reads CSV, Excel and JSON into a typed [`Dataset`](forge_core::Dataset),
//! extracts raw text from PDF, DOCX and plain-text documents, profiles
//! datasets, renders them as LLM context, manages the upload directory and
//! generates the bundled sample datasets.

pub mod context;
pub mod document;
pub mod error;
pub mod format;
pub mod profile;
pub mod sample;
pub mod tabular;
pub mod uploads;

pub use context::to_context;
pub use error::IngestError;
pub use format::{
    file_extension, load_bytes, load_path, DocumentFormat, FileKind, LoadedContent,
    TabularFormat,
};
pub use profile::{
    profile, CategoricalSummary, ColumnProfile, DataProfile, NumericSummary, ValueCount,
};
pub use uploads::{StoredFile, UploadStore};
