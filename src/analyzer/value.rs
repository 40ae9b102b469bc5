use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A scalar or nested value an [`Analyzer`](super::Analyzer) may report.
///
/// Mirrors the "numbers, strings, or nested maps" contract of
/// `get_analysis()` (§4.7/§6) with one additional leaf, `Int`, since many
/// analyzer metrics (trade counts) are naturally integral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisValue {
    Number(f64),
    Int(i64),
    Text(String),
    Map(OrderedMap),
}

impl From<f64> for AnalysisValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AnalysisValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for AnalysisValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OrderedMap> for AnalysisValue {
    fn from(value: OrderedMap) -> Self {
        Self::Map(value)
    }
}

/// An insertion-order-preserving map of named metrics.
///
/// A `SmallVec`-backed association list gives predictable iteration
/// order and avoids a heap allocation for the common case of a handful
/// of named metrics, at the cost of O(n) lookup. Entries are kept in
/// *insertion* order rather than sorted by key — `get_analysis()` must
/// read back in the order an analyzer recorded its metrics, matching an
/// `OrderedDict` in the original implementation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderedMap {
    inner: SmallVec<[(String, AnalysisValue); 8]>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites (in place, keeping its original position) a
    /// named metric.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AnalysisValue>) {
        let key = key.into();
        let value = value.into();
        match self.inner.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.inner.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AnalysisValue> {
        self.inner.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnalysisValue)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("sqn", 1.5);
        map.insert("trades", 10i64);
        map.insert("note", "ok".to_string());

        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["sqn", "trades", "note"]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert("a", 1.0);
        map.insert("b", 2.0);
        map.insert("a", 3.0);

        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&AnalysisValue::Number(3.0)));
    }

    #[test]
    fn nested_maps_round_trip_through_serde() {
        let mut inner = OrderedMap::new();
        inner.insert("count", 3i64);

        let mut outer = OrderedMap::new();
        outer.insert("bucket_2023", inner.clone());

        let json = serde_json::to_string(&outer).unwrap();
        let back: OrderedMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("bucket_2023"), Some(&AnalysisValue::Map(inner)));
    }
}
