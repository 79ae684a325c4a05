//! InsightForge storage crate - SQLite persistence for named vector stores.
//!
//! Provides a WAL-mode SQLite database with migrations and a repository
//! that saves and restores retrieval indexes under a name.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{normalize_store_name, SavedStore, StoreSummary, VectorStoreRepository};
