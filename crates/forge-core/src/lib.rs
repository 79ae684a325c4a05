//! Shared configuration, error, and data model types for InsightForge.
//!
//! Every other `forge-*` crate depends on this one. It holds the tabular
//! `Dataset`, retrieval chunks, analysis results, and the TOML-backed
//! `ForgeConfig`.

pub mod config;
pub mod error;
pub mod types;

pub use config::ForgeConfig;
pub use error::{ForgeError, Result};
pub use types::*;
