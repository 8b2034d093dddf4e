use crate::domains::export::csv_record::CsvRecord;
use crate::domains::export::types::ExportStats;
use crate::errors::{ExportError, ExportResult};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
        }
    }
}

/// CSV writer that builds a whole file in memory.
///
/// The header row is written when the writer is created, so even a writer
/// that never sees a record produces a valid one-row file.
pub struct CsvBufferWriter {
    inner: csv::Writer<Vec<u8>>,
    stats: ExportStats,
    start_time: Instant,
}

impl CsvBufferWriter {
    pub fn new<T: CsvRecord>(config: &CsvConfig) -> ExportResult<Self> {
        let mut inner = csv::WriterBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote_char)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        inner.write_record(T::headers())?;

        Ok(Self {
            inner,
            stats: ExportStats::default(),
            start_time: Instant::now(),
        })
    }

    pub fn write_record<T: CsvRecord>(&mut self, record: &T) -> ExportResult<()> {
        self.inner.write_record(record.to_csv())?;
        self.stats.records_written += 1;
        Ok(())
    }

    /// Flush and hand back the finished buffer
    pub fn finish(self) -> ExportResult<(Vec<u8>, ExportStats)> {
        let mut stats = self.stats;
        let buffer = self
            .inner
            .into_inner()
            .map_err(|e| ExportError::Serialization(e.to_string()))?;

        stats.bytes_written = buffer.len();
        stats.duration_ms = self.start_time.elapsed().as_millis() as u64;
        Ok((buffer, stats))
    }
}

/// Serialize `records` in the given order, header first.
///
/// Deterministic: the same input always yields the same bytes.
pub fn serialize_records<T: CsvRecord>(
    records: &[T],
    config: &CsvConfig,
) -> ExportResult<(Vec<u8>, ExportStats)> {
    let mut writer = CsvBufferWriter::new::<T>(config)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.finish()
}
