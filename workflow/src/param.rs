use std::fmt;

use crate::Value;

/// Prefix applied to every rendered parameterization segment, e.g. `_subject_001`.
const SEGMENT_PREFIX: char = '_';

/// The iteration values in effect for one task instance, in the order
/// they were bound (outermost iterable first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameterization {
    pairs: Vec<(String, Value)>,
}

impl Parameterization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a (key, value) pair. Replaces the value if `key` is already bound.
    pub fn push(&mut self, key: &str, value: Value) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.pairs.push((key.to_owned(), value)),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.push(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// True if every key bound in both has the same value in both.
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.pairs
            .iter()
            .all(|(k, v)| other.get(k).map_or(true, |other_v| other_v == v))
    }

    /// Add the pairs of `other` whose keys are not yet bound here.
    pub fn merge(&mut self, other: &Self) {
        for (k, v) in &other.pairs {
            if self.get(k).is_none() {
                self.pairs.push((k.clone(), v.clone()));
            }
        }
    }

    /// Rendered `_<key>_<value>` segments, one per pair.
    pub fn segments(&self) -> impl Iterator<Item = String> + '_ {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{SEGMENT_PREFIX}{k}{SEGMENT_PREFIX}{v}"))
    }
}

/// Compact form for log and ui messages, e.g. `subject=001+run=2`.
impl fmt::Display for Parameterization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
