//! Aggregation of records.
use super::{Record, RecordValue};
use log::warn;
use std::collections::{hash_map::Entry, HashMap};
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them.
///
/// Scalars of a key stored once are passed through. Scalars stored several times
/// are summarized as `{key}_mean`, `{key}_min` and `{key}_max`. For other types of
/// values, the most recent one is kept.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

enum Collected {
    Scalars(Vec<f32>),
    Latest(RecordValue),
}

fn summarize(key: &str, vs: &[f32], record: &mut Record) {
    if vs.len() == 1 {
        record.insert(key, RecordValue::Scalar(vs[0]));
        return;
    }
    let min = vs.iter().copied().fold(f32::INFINITY, f32::min);
    let max = vs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = vs.iter().sum::<f32>() / vs.len() as f32;
    record.insert(format!("{}_mean", key), RecordValue::Scalar(mean));
    record.insert(format!("{}_min", key), RecordValue::Scalar(min));
    record.insert(format!("{}_max", key), RecordValue::Scalar(max));
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Aggregates the stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut collected = HashMap::<String, Collected, Xxh3Builder>::default();

        for record in self.data.drain(..) {
            for (key, value) in record.into_iter_in_record() {
                match value {
                    RecordValue::Scalar(v) => match collected.entry(key) {
                        Entry::Occupied(mut e) => match e.get_mut() {
                            Collected::Scalars(vs) => vs.push(v),
                            Collected::Latest(_) => warn!("Ignored a scalar value for a non-scalar key"),
                        },
                        Entry::Vacant(e) => {
                            e.insert(Collected::Scalars(vec![v]));
                        }
                    },
                    value => {
                        if let Some(Collected::Scalars(_)) = collected.get(&key) {
                            warn!("Ignored a non-scalar value for scalar key {}", key);
                        } else {
                            collected.insert(key, Collected::Latest(value));
                        }
                    }
                }
            }
        }

        let mut record = Record::empty();
        for (key, c) in collected.into_iter() {
            match c {
                Collected::Scalars(vs) => summarize(&key, &vs, &mut record),
                Collected::Latest(value) => record.insert(key, value),
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalar("loss_q1", 1.0));
        storage.store(Record::from_slice(&[
            ("loss_q1", RecordValue::Scalar(3.0)),
            ("eval_return", RecordValue::Scalar(-120.0)),
        ]));
        storage.store(Record::from_scalar("loss_q1", 2.0));
        storage.store(Record::from_slice(&[(
            "note",
            RecordValue::String("first".into()),
        )]));
        storage.store(Record::from_slice(&[(
            "note",
            RecordValue::String("second".into()),
        )]));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss_q1_mean").unwrap(), 2.0);
        assert_eq!(record.get_scalar("loss_q1_min").unwrap(), 1.0);
        assert_eq!(record.get_scalar("loss_q1_max").unwrap(), 3.0);
        assert_eq!(record.get_scalar("eval_return").unwrap(), -120.0);
        assert_eq!(record.get_string("note").unwrap(), "second");
        assert!(record.get("loss_q1").is_none());
        assert!(storage.is_empty());
        assert!(storage.aggregate().is_empty());
    }
}
