use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

/// Marker carried by records written during the metadata migration pass.
pub const DEFAULT_MARKER_FIELD: &str = "_metadata";

/// One document drawn from a collection for schema inference. Never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub collection: String,
    pub document: Value,
}

impl SampleRecord {
    pub fn new(collection: impl Into<String>, document: Value) -> Self {
        Self { collection: collection.into(), document }
    }

    /// Resolves `path` against the document. An exact key match wins over dotted descent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let obj = self.document.as_object()?;
        if let Some(v) = obj.get(path) {
            return Some(v);
        }
        let mut current = &self.document;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Predicate handed to a [`crate::db::SampleSource`] to choose representative records.
///
/// A record qualifies when none of `exclude_if_present` appear as top-level fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleFilter {
    #[serde(default)]
    pub exclude_if_present: Vec<String>,
}

impl SampleFilter {
    pub fn excluding_marker(marker: impl Into<String>) -> Self {
        Self { exclude_if_present: vec![marker.into()] }
    }

    pub fn accepts(&self, document: &Value) -> bool {
        match document.as_object() {
            Some(obj) => !self.exclude_if_present.iter().any(|f| obj.contains_key(f)),
            None => false,
        }
    }

    /// Equivalent MongoDB query document, e.g. `{"_metadata": {"$exists": false}}`.
    pub fn to_mongo_filter(&self) -> Value {
        let mut filter = Map::new();
        for field in &self.exclude_if_present {
            filter.insert(field.clone(), serde_json::json!({ "$exists": false }));
        }
        Value::Object(filter)
    }
}
