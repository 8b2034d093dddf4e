//! Per-user API-call history export.
//!
//! Lists users from PostgreSQL, serializes each user's API calls to CSV and
//! uploads one object per user. See [`domains::export::ExportOrchestrator`].

pub mod config;
pub mod database;
pub mod domains;
pub mod errors;

#[cfg(test)]
mod testing;

pub use config::AppConfig;
pub use domains::export::{ExportOrchestrator, ExportReport, ExportSettings};
pub use errors::{ExportError, ExportResult};
