use serde::{ Deserialize, Serialize };
use std::collections::HashSet;
use log::{ debug, error, info };

use crate::error::{ ForgeError, Result };
use crate::schema::{ require_non_empty, FieldSpec, IndexDefinition, IndexKind, Similarity };

/// Placeholder dimension used before reconciliation against stored data.
pub const DEFAULT_DIMENSION: usize = 384;

pub const DEFAULT_TEXT_ANALYZER: &str = "lucene.standard";

pub fn vector_index_name(alias: &str) -> String {
    format!("vector_index_{}", alias)
}

pub fn text_index_name(alias: &str) -> String {
    format!("{}_search_index", alias)
}

pub fn build_vector_index(
    collection: &str,
    vector_field_path: &str,
    filter_field_paths: &[&str],
    default_dimension: usize
) -> Result<IndexDefinition> {
    build_vector_index_as(collection, collection, vector_field_path, filter_field_paths, default_dimension)
}

/// Same as [`build_vector_index`], with the index name derived from `alias`.
pub fn build_vector_index_as(
    alias: &str,
    collection: &str,
    vector_field_path: &str,
    filter_field_paths: &[&str],
    default_dimension: usize
) -> Result<IndexDefinition> {
    require_non_empty(collection, "collection name")?;
    require_non_empty(alias, "index alias")?;
    require_non_empty(vector_field_path, "vector field path")?;
    if default_dimension == 0 {
        return Err(
            ForgeError::InvalidConfiguration(
                format!("default dimension for '{}' must be positive", collection)
            )
        );
    }

    let mut fields = Vec::with_capacity(filter_field_paths.len() + 1);
    fields.push(FieldSpec::Vector {
        path: vector_field_path.to_string(),
        num_dimensions: default_dimension,
        similarity: Similarity::Cosine,
    });
    for path in filter_field_paths {
        require_non_empty(path, "filter field path")?;
        fields.push(FieldSpec::Filter { path: path.to_string() });
    }

    debug!(
        "Built vector index for '{}' on '{}' with {} filter fields",
        collection,
        vector_field_path,
        filter_field_paths.len()
    );

    Ok(IndexDefinition {
        name: vector_index_name(alias),
        kind: IndexKind::VectorSearch,
        target_collection: collection.to_string(),
        fields,
        dynamic: false,
    })
}

/// Builds a text-search index with dynamic mapping disabled. Field order follows `field_analyzers`.
pub fn build_text_index(
    collection: &str,
    field_analyzers: &[(&str, Option<&str>)]
) -> Result<IndexDefinition> {
    build_text_index_as(collection, collection, field_analyzers)
}

pub fn build_text_index_as(
    alias: &str,
    collection: &str,
    field_analyzers: &[(&str, Option<&str>)]
) -> Result<IndexDefinition> {
    require_non_empty(collection, "collection name")?;
    require_non_empty(alias, "index alias")?;
    if field_analyzers.is_empty() {
        return Err(
            ForgeError::InvalidConfiguration(
                format!("text index for '{}' needs at least one field", collection)
            )
        );
    }

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(field_analyzers.len());
    for (path, analyzer) in field_analyzers {
        require_non_empty(path, "text field path")?;
        if !seen.insert(*path) {
            return Err(
                ForgeError::InvalidConfiguration(
                    format!("text field '{}' listed twice for '{}'", path, collection)
                )
            );
        }
        fields.push(FieldSpec::Text {
            path: path.to_string(),
            analyzer: analyzer.map(String::from),
        });
    }

    debug!("Built text index for '{}' with {} fields", collection, fields.len());

    Ok(IndexDefinition {
        name: text_index_name(alias),
        kind: IndexKind::TextSearch,
        target_collection: collection.to_string(),
        fields,
        dynamic: false,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFieldEntry {
    pub path: String,
    #[serde(default)]
    pub analyzer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexShape {
    Vector {
        vector_path: String,
        #[serde(default)]
        filter_paths: Vec<String>,
        /// Field read from sample documents. Defaults to `vector_path`.
        #[serde(default)]
        sample_field: Option<String>,
        /// Take the dimension inferred for another catalog key instead of sampling.
        #[serde(default)]
        dimension_from: Option<String>,
    },
    Text {
        fields: Vec<TextFieldEntry>,
    },
}

/// One entry of the index catalog: a logical key, its collection and the index shape to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub key: String,
    pub collection: String,
    /// Used to derive the index name. Defaults to the collection name.
    #[serde(default)]
    pub alias: Option<String>,
    pub index: IndexShape,
}

impl CollectionSpec {
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.collection)
    }

    pub fn build(&self, default_dimension: usize) -> Result<IndexDefinition> {
        require_non_empty(&self.key, "catalog key")?;
        match &self.index {
            IndexShape::Vector { vector_path, filter_paths, .. } => {
                let filters: Vec<&str> = filter_paths.iter().map(String::as_str).collect();
                build_vector_index_as(
                    self.alias(),
                    &self.collection,
                    vector_path,
                    &filters,
                    default_dimension
                )
            }
            IndexShape::Text { fields } => {
                let entries: Vec<(&str, Option<&str>)> = fields
                    .iter()
                    .map(|f| (f.path.as_str(), f.analyzer.as_deref()))
                    .collect();
                build_text_index_as(self.alias(), &self.collection, &entries)
            }
        }
    }

    /// Field to read from sample documents, if this entry is sampled directly.
    pub fn sample_field(&self) -> Option<&str> {
        match &self.index {
            IndexShape::Vector { vector_path, sample_field, dimension_from: None, .. } =>
                Some(sample_field.as_deref().unwrap_or(vector_path)),
            _ => None,
        }
    }

    pub fn dimension_from(&self) -> Option<&str> {
        match &self.index {
            IndexShape::Vector { dimension_from, .. } => dimension_from.as_deref(),
            IndexShape::Text { .. } => None,
        }
    }
}

fn text_field(path: &str, analyzer: Option<&str>) -> TextFieldEntry {
    TextFieldEntry { path: path.to_string(), analyzer: analyzer.map(String::from) }
}

/// Catalog of the three collections behind the medical RAG pipeline.
pub fn default_catalog() -> Vec<CollectionSpec> {
    vec![
        CollectionSpec {
            key: "medical_embeddings_index".into(),
            collection: "medical_embeddings".into(),
            alias: Some("medical".into()),
            index: IndexShape::Vector {
                vector_path: "embedding_vector".into(),
                filter_paths: vec!["medical_specialty".into(), "confidence_score".into()],
                sample_field: Some("embedding".into()),
                dimension_from: None,
            },
        },
        CollectionSpec {
            key: "godzilla_index".into(),
            collection: "godzilla_medical_dataset".into(),
            alias: Some("godzilla".into()),
            index: IndexShape::Vector {
                vector_path: "text_embedding".into(),
                filter_paths: vec![
                    "medical_specialty".into(),
                    "clinical_relevance_score".into(),
                    "age_groups".into()
                ],
                sample_field: None,
                dimension_from: Some("medical_embeddings_index".into()),
            },
        },
        CollectionSpec {
            key: "drug_search_index".into(),
            collection: "pediatric_drug_dosages".into(),
            alias: Some("drug".into()),
            index: IndexShape::Text {
                fields: vec![
                    text_field("drug_name", Some(DEFAULT_TEXT_ANALYZER)),
                    text_field("generic_name", Some(DEFAULT_TEXT_ANALYZER)),
                    text_field("indication", Some(DEFAULT_TEXT_ANALYZER)),
                    text_field("age_group", None),
                    text_field("route", None)
                ],
            },
        }
    ]
}

pub fn load_catalog(path: &str) -> Result<Vec<CollectionSpec>> {
    let raw = std::fs::read_to_string(path)?;
    let catalog: Vec<CollectionSpec> = serde_json::from_str(&raw)?;
    info!("Loaded {} catalog entries from {}", catalog.len(), path);
    Ok(catalog)
}

#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub spec: CollectionSpec,
    pub definition: IndexDefinition,
}

#[derive(Debug, Default)]
pub struct CatalogBuild {
    pub built: Vec<BuiltIndex>,
    /// Catalog keys whose definition could not be constructed.
    pub rejected: Vec<(String, ForgeError)>,
}

/// Builds every catalog entry. A malformed entry is rejected on its own without affecting the rest.
pub fn build_catalog(catalog: &[CollectionSpec], default_dimension: usize) -> CatalogBuild {
    let mut out = CatalogBuild::default();
    let mut names = HashSet::new();
    let mut keys = HashSet::new();

    for spec in catalog {
        let result = spec.build(default_dimension).and_then(|definition| {
            if !keys.insert(spec.key.clone()) {
                return Err(
                    ForgeError::InvalidConfiguration(format!("duplicate catalog key '{}'", spec.key))
                );
            }
            if !names.insert(definition.name.clone()) {
                return Err(
                    ForgeError::InvalidConfiguration(
                        format!("duplicate index name '{}'", definition.name)
                    )
                );
            }
            Ok(definition)
        });

        match result {
            Ok(definition) => {
                info!(
                    "Defined index '{}' on collection '{}'",
                    definition.name,
                    definition.target_collection
                );
                out.built.push(BuiltIndex { spec: spec.clone(), definition });
            }
            Err(e) => {
                error!("Skipping catalog entry '{}': {}", spec.key, e);
                out.rejected.push((spec.key.clone(), e));
            }
        }
    }

    out
}
