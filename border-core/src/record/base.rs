//! Record.
use crate::error::LrrError;
use chrono::prelude::{DateTime, Local};
use std::collections::{
    hash_map::{IntoIter, Iter, Keys},
    HashMap,
};

/// Represents possible types of values in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A scalar, such as a loss or a return.
    Scalar(f32),

    /// A timestamp.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

impl RecordValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "Scalar",
            Self::DateTime(_) => "DateTime",
            Self::Array1(_) => "Array1",
            Self::String(_) => "String",
        }
    }
}

/// Container of key-value pairs of [`RecordValue`]s.
#[derive(Debug, Clone, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record with a scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns an iterator consuming the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Gets the value of the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records. Values of `record` take precedence.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges `record` into `self`. Values of `record` take precedence.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    fn get_typed<T>(
        &self,
        k: &str,
        expected: &str,
        f: impl Fn(&RecordValue) -> Option<T>,
    ) -> Result<T, LrrError> {
        let v = self
            .0
            .get(k)
            .ok_or_else(|| LrrError::RecordKeyError(k.to_string()))?;
        f(v).ok_or_else(|| {
            LrrError::RecordValueTypeError(format!(
                "expected {} for {}, found {}",
                expected,
                k,
                v.type_name()
            ))
        })
    }

    /// Gets a scalar value.
    pub fn get_scalar(&self, k: &str) -> Result<f32, LrrError> {
        self.get_typed(k, "Scalar", |v| match v {
            RecordValue::Scalar(v) => Some(*v),
            _ => None,
        })
    }

    /// Gets a 1-dimensional array.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, LrrError> {
        self.get_typed(k, "Array1", |v| match v {
            RecordValue::Array1(v) => Some(v.clone()),
            _ => None,
        })
    }

    /// Gets a string.
    pub fn get_string(&self, k: &str) -> Result<String, LrrError> {
        self.get_typed(k, "String", |v| match v {
            RecordValue::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    /// Returns `true` if the record has no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_values() {
        let mut record = Record::from_scalar("loss_q1", 1.5);
        record.insert("obs", RecordValue::Array1(vec![1.0, 2.0]));
        record.insert("env", RecordValue::String("Pendulum".into()));

        assert_eq!(record.get_scalar("loss_q1").unwrap(), 1.5);
        assert_eq!(record.get_array1("obs").unwrap(), vec![1.0, 2.0]);
        assert_eq!(record.get_string("env").unwrap(), "Pendulum");
        assert!(matches!(
            record.get_scalar("obs"),
            Err(LrrError::RecordValueTypeError(_))
        ));
        assert!(matches!(
            record.get_scalar("loss_q2"),
            Err(LrrError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_merge_overwrites() {
        let a = Record::from_slice(&[
            ("alpha", RecordValue::Scalar(0.2)),
            ("loss_policy", RecordValue::Scalar(-1.0)),
        ]);
        let b = Record::from_scalar("alpha", 0.1);
        let mut c = a.clone().merge(b.clone());
        assert_eq!(c.len(), 2);
        assert_eq!(c.get_scalar("alpha").unwrap(), 0.1);

        c.merge_inplace(Record::from_scalar("loss_policy", 3.0));
        assert_eq!(c.get_scalar("loss_policy").unwrap(), 3.0);
    }
}
