//! Base implementation of records for logging.
use crate::error::ForestFireError;
use std::collections::{hash_map::Iter, HashMap};

/// A value stored in a [`Record`].
#[derive(Debug, Clone)]
pub enum RecordValue {
    /// A single floating-point value, typically a loss or a return.
    Scalar(f32),

    /// A text value.
    String(String),
}

/// Named values produced by an optimization step or an evaluation.
#[derive(Debug)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
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

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records, consuming both.
    ///
    /// Values of `record` overwrite those of `self` with the same key.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    pub fn merge_inplace(&mut self, record: Record) {
        for (k, v) in record.0 {
            self.0.insert(k, v);
        }
    }

    /// Gets a scalar value from the record.
    ///
    /// Fails if the key does not exist or the value is not a scalar.
    pub fn get_scalar(&self, k: &str) -> Result<f32, ForestFireError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(ForestFireError::RecordValueTypeError("Scalar".to_string())),
            None => Err(ForestFireError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a string value from the record.
    pub fn get_string(&self, k: &str) -> Result<String, ForestFireError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(ForestFireError::RecordValueTypeError("String".to_string())),
            None => Err(ForestFireError::RecordKeyError(k.to_string())),
        }
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_scalar() {
        let record = Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(0.25)),
            ("agent", RecordValue::String("td3".to_string())),
        ]);

        assert_eq!(record.get_scalar("loss_critic").unwrap(), 0.25);
        assert!(matches!(
            record.get_scalar("loss_actor"),
            Err(ForestFireError::RecordKeyError(_))
        ));
        assert!(matches!(
            record.get_scalar("agent"),
            Err(ForestFireError::RecordValueTypeError(_))
        ));
    }

    #[test]
    fn test_merge() {
        let r1 = Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(1.0)),
            ("loss_actor", RecordValue::Scalar(2.0)),
        ]);
        let r2 = Record::from_scalar("loss_critic", 3.0);
        let merged = r1.merge(r2);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get_scalar("loss_critic").unwrap(), 3.0);

        let mut r3 = Record::empty();
        assert!(r3.is_empty());
        r3.merge_inplace(merged);
        assert_eq!(r3.get_scalar("loss_actor").unwrap(), 2.0);
    }
}
