pub mod csv_writer;

pub use csv_writer::{serialize_records, CsvBufferWriter, CsvConfig};
