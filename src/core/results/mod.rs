pub mod error;
pub mod record;
pub mod sink;

pub use error::ResultError;
pub use record::{RunResult, DATETIME_FORMAT};
pub use sink::{JsonFileSink, MemorySink, ResultSink};
