pub mod csv_record;
pub mod orchestrator;
pub mod types;
pub mod worker;
pub mod writers;

pub use csv_record::{format_call_timestamp, sanitize_key_component, CsvRecord};
pub use orchestrator::ExportOrchestrator;
pub use types::{
    ExportArtifact, ExportReceipt, ExportReport, ExportSettings, ExportStats, FailureStage,
    ReportSummary, UserExportFailure, UserExportOutcome, DEFAULT_BUCKET,
};
pub use worker::ExportWorker;
pub use writers::{serialize_records, CsvBufferWriter, CsvConfig};
