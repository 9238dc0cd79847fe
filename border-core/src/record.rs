//! Types and traits for recording training metrics.
//!
//! * [`Record`] - key-value container of [`RecordValue`]s
//! * [`Recorder`] - writes a record to some destination
//! * [`AggregateRecorder`] - stores records and writes their aggregation on flush
//! * [`RecordStorage`] - aggregation of records, used by aggregate recorders
//! * [`BufferedRecorder`] - keeps flushed records in memory
//! * [`NullRecorder`] - discards all records
//!
//! ```rust
//! use border_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss_q1", 0.5);
//! record.insert("alpha", RecordValue::Scalar(0.2));
//! assert_eq!(record.get_scalar("alpha").unwrap(), 0.2);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
