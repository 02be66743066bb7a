use serde::ser::{ SerializeMap, Serializer };
use serde::Serialize;
use std::path::Path;
use log::info;

use crate::error::{ ForgeError, Result };

/// Distance metric used by a vector-similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Similarity {
    Cosine,
    Euclidean,
    DotProduct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexKind {
    #[serde(rename = "vectorSearch")]
    VectorSearch,
    #[serde(rename = "search")]
    TextSearch,
}

/// One field entry of an index definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldSpec {
    Vector {
        path: String,
        #[serde(rename = "numDimensions")]
        num_dimensions: usize,
        similarity: Similarity,
    },
    Filter {
        path: String,
    },
    Text {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        analyzer: Option<String>,
    },
}

impl FieldSpec {
    pub fn path(&self) -> &str {
        match self {
            FieldSpec::Vector { path, .. } | FieldSpec::Filter { path } | FieldSpec::Text { path, .. } => path,
        }
    }
}

/// A named search index to be created on one collection.
///
/// Serializes to the JSON document accepted by the Atlas Search index editor,
/// so `target_collection` is not part of the serialized form.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub kind: IndexKind,
    pub target_collection: String,
    pub fields: Vec<FieldSpec>,
    /// Dynamic mapping flag for text indexes. Ignored for vector indexes.
    pub dynamic: bool,
}

impl IndexDefinition {
    /// First vector field's declared dimension, if any.
    pub fn num_dimensions(&self) -> Option<usize> {
        self.fields.iter().find_map(|f| {
            match f {
                FieldSpec::Vector { num_dimensions, .. } => Some(*num_dimensions),
                _ => None,
            }
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

struct VectorDefinition<'a> {
    fields: &'a [FieldSpec],
}

impl Serialize for VectorDefinition<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("fields", self.fields)?;
        map.end()
    }
}

struct TextMappings<'a> {
    dynamic: bool,
    fields: &'a [FieldSpec],
}

#[derive(Serialize)]
struct StringMapping<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    analyzer: Option<&'a str>,
}

impl Serialize for TextMappings<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut fields = serde_json::Map::new();
        for field in self.fields {
            if let FieldSpec::Text { path, analyzer } = field {
                let mapping = StringMapping { kind: "string", analyzer: analyzer.as_deref() };
                let value = serde_json::to_value(&mapping).map_err(serde::ser::Error::custom)?;
                fields.insert(path.clone(), value);
            }
        }

        let mut mappings = serializer.serialize_map(Some(1))?;
        mappings.serialize_entry(
            "mappings",
            &serde_json::json!({ "dynamic": self.dynamic, "fields": fields })
        )?;
        mappings.end()
    }
}

impl Serialize for IndexDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("type", &self.kind)?;
        match self.kind {
            IndexKind::VectorSearch => {
                map.serialize_entry("definition", &(VectorDefinition { fields: &self.fields }))?;
            }
            IndexKind::TextSearch => {
                map.serialize_entry(
                    "definition",
                    &(TextMappings { dynamic: self.dynamic, fields: &self.fields })
                )?;
            }
        }
        map.end()
    }
}

/// Outcome of dimension reconciliation for one artifact entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// The vector dimension was confirmed against stored data.
    Applied {
        dimension: usize,
    },
    /// The definition still carries the placeholder dimension.
    Unapplied {
        reason: String,
    },
    /// Text indexes carry no dimension.
    NotApplicable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    #[serde(skip)]
    pub key: String,
    pub collection: String,
    pub status: ReconcileStatus,
    pub index: IndexDefinition,
}

/// A catalog entry whose definition could not be built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    pub key: String,
    pub reason: String,
}

/// Final output of a run: every defined index keyed by its logical name, in catalog order,
/// plus the catalog entries that were rejected before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct IndexArtifact {
    pub entries: Vec<ArtifactEntry>,
    pub rejected: Vec<RejectedEntry>,
}

impl IndexArtifact {
    pub fn get(&self, key: &str) -> Option<&ArtifactEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &IndexDefinition)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.index))
    }

    /// Entries that still carry an unverified placeholder dimension.
    pub fn unapplied(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|e| {
            match &e.status {
                ReconcileStatus::Unapplied { reason } => Some((e.key.as_str(), reason.as_str())),
                _ => None,
            }
        })
    }

    pub fn rejection(&self, key: &str) -> Option<&RejectedEntry> {
        self.rejected.iter().find(|r| r.key == key)
    }

    /// True when every catalog entry was built and carries a confirmed dimension or none at all.
    pub fn is_fully_reconciled(&self) -> bool {
        self.rejected.is_empty() && self.unapplied().next().is_none()
    }

    /// Bare index definitions keyed by logical name, without reconciliation status.
    pub fn definitions_json(&self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (key, definition) in self.definitions() {
            map.insert(key.to_string(), definition.to_json()?);
        }
        Ok(serde_json::Value::Object(map))
    }

    pub fn write_artifact(&self, output_path: &str) -> Result<()> {
        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(output_path, serde_json::to_string_pretty(self)?)?;
        info!("Wrote {} index definitions to {}", self.entries.len(), output_path);
        Ok(())
    }
}

struct EntryMap<'a>(&'a [ArtifactEntry]);

impl Serialize for EntryMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.key, entry)?;
        }
        map.end()
    }
}

/// Serializes as `{"indexes": {<key>: <entry>, ...}, "rejected": [{"key", "reason"}, ...]}`.
impl Serialize for IndexArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("indexes", &EntryMap(&self.entries))?;
        map.serialize_entry("rejected", &self.rejected)?;
        map.end()
    }
}

pub(crate) fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ForgeError::InvalidConfiguration(format!("{} must not be empty", what)));
    }
    Ok(())
}
