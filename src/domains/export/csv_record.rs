use crate::domains::export::types::CSV_HEADER;
use crate::domains::history::ApiCallRecord;
use chrono::{DateTime, TimeZone, Timelike, Utc};

/// Trait for types that can be exported to CSV
pub trait CsvRecord {
    /// Get CSV headers for this type
    fn headers() -> Vec<&'static str>;

    /// Convert to CSV row
    fn to_csv(&self) -> Vec<String>;
}

impl CsvRecord for ApiCallRecord {
    fn headers() -> Vec<&'static str> {
        CSV_HEADER.to_vec()
    }

    fn to_csv(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.endpoint.clone(),
            format_call_timestamp(&self.call_timestamp),
        ]
    }
}

/// Render a timestamp as UTC `YYYY-MM-DDTHH:MM:SS.ffffffff`.
///
/// Always eight fractional digits (truncated, not rounded). The output never
/// depends on the host timezone or locale.
pub fn format_call_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String {
    let utc = ts.with_timezone(&Utc);
    // Leap seconds report nanos >= 1_000_000_000
    let fraction = (utc.nanosecond() % 1_000_000_000) / 10;
    format!("{}.{:08}", utc.format("%Y-%m-%dT%H:%M:%S"), fraction)
}

/// Make a free-text user name safe to embed in an object key.
///
/// Path separators and control characters become `_`. A name made only of
/// dots would form a relative path segment and is replaced the same way.
pub fn sanitize_key_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        "_".repeat(cleaned.len())
    } else {
        cleaned
    }
}
