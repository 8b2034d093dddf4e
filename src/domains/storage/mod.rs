pub mod object_sink;
pub mod retry;

pub use object_sink::{ObjectSink, OpenDalObjectSink, StorageBackend};
pub use retry::{RetryPolicy, RetryingObjectSink};
