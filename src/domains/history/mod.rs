pub mod repository;
pub mod types;

pub use repository::{PgRowSource, RowSource};
pub use types::{ApiCallRecord, User};
