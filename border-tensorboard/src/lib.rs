//! Writes training records as TFRecord files readable by TensorBoard.
use border_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use log::{trace, warn};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// Only [`RecordValue::Scalar`] is written. Timestamps are discarded silently and
/// other values are dropped with a warning unless they are ignored explicitly.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    ignore_unsupported_value: bool,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "env_steps".to_string(),
            ignore_unsupported_value: true,
            storage: RecordStorage::new(),
        }
    }

    /// Construct a [`TensorboardRecorder`] warning on unsupported record values.
    pub fn new_with_check_unsupported_value<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            ignore_unsupported_value: false,
            ..Self::new(logdir)
        }
    }

    /// Sets the key of the scalar used as the step by [`Recorder::write`].
    pub fn step_key(mut self, key: impl Into<String>) -> Self {
        self.step_key = key.into();
        self
    }

    fn write_at(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::DateTime(_) => {}
                _ => {
                    if !self.ignore_unsupported_value {
                        warn!("Unsupported value for TensorBoard: {:?}", (k, v));
                    }
                }
            }
        }
        self.writer.flush();
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a record at the step given by the scalar of the step key.
    ///
    /// A record without the step key is dropped.
    fn write(&mut self, record: Record) {
        match record.get_scalar(&self.step_key) {
            Ok(step) => self.write_at(&record, step as usize),
            Err(_) => warn!("Record without {} is dropped", self.step_key),
        }
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let record = self.storage.aggregate();
        if record.is_empty() {
            return;
        }
        trace!("Write {} values at step {}", record.len(), step);
        self.write_at(&record, step.max(0) as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn n_files(dir: &Path) -> usize {
        fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
    }

    #[test]
    fn test_flush_writes_event_file() {
        let dir = TempDir::new("tensorboard").unwrap();
        let mut recorder = TensorboardRecorder::new(dir.path());

        recorder.store(Record::from_scalar("loss_q1", 1.0));
        recorder.store(Record::from_scalar("loss_q1", 3.0));
        recorder.store(Record::from_slice(&[(
            "note",
            RecordValue::String("ignored".into()),
        )]));
        recorder.flush(100);

        // Nothing is written for an empty storage.
        recorder.flush(200);

        assert!(n_files(dir.path()) > 0);
    }

    #[test]
    fn test_write_without_step_is_dropped() {
        let dir = TempDir::new("tensorboard").unwrap();
        let mut recorder = TensorboardRecorder::new_with_check_unsupported_value(dir.path())
            .step_key("opt_steps");
        recorder.write(Record::from_scalar("q_bias", 0.5));
        recorder.write(Record::from_slice(&[
            ("opt_steps", RecordValue::Scalar(10.0)),
            ("q_bias", RecordValue::Scalar(0.5)),
            ("weights", RecordValue::Array1(vec![0.0, 1.0])),
        ]));
        assert!(n_files(dir.path()) > 0);
    }
}
