use serde_json::Value;
use std::collections::HashMap;
use log::{ debug, error, info, warn };

use crate::builder::CatalogBuild;
use crate::db::SampleSource;
use crate::error::{ ForgeError, Result };
use crate::sample::{ SampleFilter, SampleRecord };
use crate::schema::{
    ArtifactEntry,
    FieldSpec,
    IndexArtifact,
    IndexDefinition,
    ReconcileStatus,
    RejectedEntry,
};

/// A stored embedding as found in a sample document.
///
/// Older write paths stored vectors as their textual representation rather than as arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingValue {
    NativeSequence(Vec<f64>),
    EncodedText(String),
}

impl EmbeddingValue {
    pub fn from_json(field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let n = item.as_f64().ok_or_else(|| ForgeError::MalformedEmbedding {
                        field: field.to_string(),
                        cause: format!("element {} is not a number: {}", i, item),
                    })?;
                    out.push(n);
                }
                Ok(EmbeddingValue::NativeSequence(out))
            }
            Value::String(s) => Ok(EmbeddingValue::EncodedText(s.clone())),
            Value::Null => Err(ForgeError::MissingField(field.to_string())),
            other =>
                Err(ForgeError::MalformedEmbedding {
                    field: field.to_string(),
                    cause: format!("expected a numeric sequence, found {}", json_type(other)),
                }),
        }
    }

    pub fn dimension(&self, field: &str) -> Result<usize> {
        let len = match self {
            EmbeddingValue::NativeSequence(values) => values.len(),
            EmbeddingValue::EncodedText(text) =>
                parse_number_sequence(text)
                    .map_err(|cause| ForgeError::MalformedEmbedding {
                        field: field.to_string(),
                        cause,
                    })?
                    .len(),
        };
        if len == 0 {
            return Err(ForgeError::EmptyEmbedding(field.to_string()));
        }
        Ok(len)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a literal numeric sequence such as `[0.1, -2, 3e-4]` or `(1, 2,)`.
pub fn parse_number_sequence(text: &str) -> std::result::Result<Vec<f64>, String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .ok_or_else(|| {
            let preview: String = trimmed.chars().take(32).collect();
            format!("not a bracketed sequence: '{}'", preview)
        })?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    // `(x)` is a parenthesized scalar, only `(x,)` is a one-element tuple.
    if trimmed.starts_with('(') && !inner.contains(',') {
        return Err(format!("parenthesized value without a comma is not a sequence: '{}'", inner.trim()));
    }

    let mut parts: Vec<&str> = inner.split(',').collect();
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let token = part.trim();
            match token.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                Ok(_) => Err(format!("element {} is not a finite number: '{}'", i, token)),
                Err(e) => Err(format!("element {} ('{}'): {}", i, token, e)),
            }
        })
        .collect()
}

/// Determines the stored vector width of `embedding_field_path` in `sample`.
pub fn infer_dimension(sample: &SampleRecord, embedding_field_path: &str) -> Result<usize> {
    let raw = sample
        .get(embedding_field_path)
        .ok_or_else(|| ForgeError::MissingField(embedding_field_path.to_string()))?;
    let value = EmbeddingValue::from_json(embedding_field_path, raw)?;
    value.dimension(embedding_field_path)
}

/// Overwrites the dimension of the first vector field in `definition`.
pub fn apply_dimension(definition: &mut IndexDefinition, dimension: usize) -> Result<()> {
    let slot = definition.fields.iter_mut().find_map(|f| {
        match f {
            FieldSpec::Vector { num_dimensions, .. } => Some(num_dimensions),
            _ => None,
        }
    });
    match slot {
        Some(num_dimensions) => {
            *num_dimensions = dimension;
            Ok(())
        }
        None => Err(ForgeError::NoVectorFieldPresent(definition.name.clone())),
    }
}

/// Per-collection progress through reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileState {
    Pending,
    SampleFetched(SampleRecord),
    DimensionInferred(usize),
    InferenceSkipped(String),
    InferenceFailed(String),
    Applied(usize),
    Unapplied(String),
}

impl ReconcileState {
    fn label(&self) -> &'static str {
        match self {
            ReconcileState::Pending => "pending",
            ReconcileState::SampleFetched(_) => "sample_fetched",
            ReconcileState::DimensionInferred(_) => "dimension_inferred",
            ReconcileState::InferenceSkipped(_) => "inference_skipped",
            ReconcileState::InferenceFailed(_) => "inference_failed",
            ReconcileState::Applied(_) => "applied",
            ReconcileState::Unapplied(_) => "unapplied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcileState::Applied(_) | ReconcileState::Unapplied(_))
    }
}

/// Corrects placeholder vector dimensions using one sample per collection.
pub struct Reconciler<'a> {
    source: &'a dyn SampleSource,
    filter: SampleFilter,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a dyn SampleSource, filter: SampleFilter) -> Self {
        Self { source, filter }
    }

    async fn advance(
        &self,
        key: &str,
        collection: &str,
        field: &str,
        definition: &mut IndexDefinition,
        state: ReconcileState
    ) -> Result<ReconcileState> {
        let next = match state {
            ReconcileState::Pending => {
                match self.source.fetch_sample(collection, &self.filter).await {
                    Ok(Some(sample)) => ReconcileState::SampleFetched(sample),
                    Ok(None) =>
                        ReconcileState::InferenceSkipped(
                            format!("no qualifying sample in collection '{}'", collection)
                        ),
                    Err(e) => ReconcileState::InferenceFailed(e.to_string()),
                }
            }
            ReconcileState::SampleFetched(sample) => {
                match infer_dimension(&sample, field) {
                    Ok(dimension) => ReconcileState::DimensionInferred(dimension),
                    Err(e) if e.is_soft() => ReconcileState::InferenceFailed(e.to_string()),
                    Err(e) => {
                        return Err(e);
                    }
                }
            }
            ReconcileState::DimensionInferred(dimension) => {
                apply_dimension(definition, dimension)?;
                ReconcileState::Applied(dimension)
            }
            ReconcileState::InferenceSkipped(reason) => ReconcileState::Unapplied(reason),
            ReconcileState::InferenceFailed(reason) => {
                warn!("Could not infer dimension for '{}': {}", key, reason);
                ReconcileState::Unapplied(reason)
            }
            terminal => terminal,
        };
        debug!("'{}' -> {}", key, next.label());
        Ok(next)
    }

    /// Runs one collection's pipeline to a terminal state.
    pub async fn reconcile_one(
        &self,
        key: &str,
        collection: &str,
        field: &str,
        definition: &mut IndexDefinition
    ) -> Result<ReconcileState> {
        let mut state = ReconcileState::Pending;
        while !state.is_terminal() {
            state = self.advance(key, collection, field, definition, state).await?;
        }
        Ok(state)
    }

    /// Reconciles every vector index in `build` and assembles the final artifact.
    ///
    /// Sampled entries are processed first, in catalog order, so entries sharing another
    /// entry's dimension see its outcome. Rejected catalog entries are carried into the
    /// artifact. Only contract violations return `Err`.
    pub async fn reconcile(&self, build: CatalogBuild) -> Result<IndexArtifact> {
        let CatalogBuild { built, rejected } = build;
        let rejected: Vec<RejectedEntry> = rejected
            .into_iter()
            .map(|(key, e)| RejectedEntry { key, reason: e.to_string() })
            .collect();
        let mut statuses: Vec<Option<ReconcileStatus>> = vec![None; built.len()];
        let mut definitions: Vec<IndexDefinition> = built
            .iter()
            .map(|b| b.definition.clone())
            .collect();
        let mut inferred: HashMap<&str, std::result::Result<usize, String>> = HashMap::new();

        for (i, entry) in built.iter().enumerate() {
            let Some(field) = entry.spec.sample_field() else {
                continue;
            };
            info!(
                "Sampling '{}' from collection '{}' for index '{}'",
                field,
                entry.spec.collection,
                entry.definition.name
            );
            let state = self.reconcile_one(
                &entry.spec.key,
                &entry.spec.collection,
                field,
                &mut definitions[i]
            ).await?;
            let status = terminal_status(state);
            inferred.insert(
                entry.spec.key.as_str(),
                match &status {
                    ReconcileStatus::Applied { dimension } => Ok(*dimension),
                    ReconcileStatus::Unapplied { reason } => Err(reason.clone()),
                    ReconcileStatus::NotApplicable => Err("not a vector index".to_string()),
                }
            );
            statuses[i] = Some(status);
        }

        for (i, entry) in built.iter().enumerate() {
            let Some(upstream) = entry.spec.dimension_from() else {
                continue;
            };
            let status = match inferred.get(upstream) {
                Some(Ok(dimension)) => {
                    apply_dimension(&mut definitions[i], *dimension)?;
                    info!("Applied dimension {} to '{}' from '{}'", dimension, entry.spec.key, upstream);
                    ReconcileStatus::Applied { dimension: *dimension }
                }
                Some(Err(reason)) => {
                    let reason = format!("dimension source '{}' unresolved: {}", upstream, reason);
                    warn!("Leaving placeholder on '{}': {}", entry.spec.key, reason);
                    ReconcileStatus::Unapplied { reason }
                }
                None => {
                    let reason = match rejected.iter().find(|r| r.key == upstream) {
                        Some(r) => format!("dimension source '{}' was rejected: {}", upstream, r.reason),
                        None => format!("dimension source '{}' is not a sampled vector index", upstream),
                    };
                    warn!("Leaving placeholder on '{}': {}", entry.spec.key, reason);
                    ReconcileStatus::Unapplied { reason }
                }
            };
            statuses[i] = Some(status);
        }

        let entries = built
            .into_iter()
            .zip(definitions)
            .zip(statuses)
            .map(|((entry, index), status)| ArtifactEntry {
                key: entry.spec.key,
                collection: entry.spec.collection,
                status: status.unwrap_or(ReconcileStatus::NotApplicable),
                index,
            })
            .collect();

        let artifact = IndexArtifact { entries, rejected };
        for (key, reason) in artifact.unapplied() {
            warn!("Index '{}' keeps its placeholder dimension: {}", key, reason);
        }
        for r in &artifact.rejected {
            warn!("Catalog entry '{}' was rejected: {}", r.key, r.reason);
        }
        Ok(artifact)
    }
}

fn terminal_status(state: ReconcileState) -> ReconcileStatus {
    match state {
        ReconcileState::Applied(dimension) => {
            info!("Embedding dimension detected: {}", dimension);
            ReconcileStatus::Applied { dimension }
        }
        ReconcileState::Unapplied(reason) => ReconcileStatus::Unapplied { reason },
        other => {
            error!("Reconciliation stopped in non-terminal state '{}'", other.label());
            ReconcileStatus::Unapplied { reason: format!("stopped in state {}", other.label()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ build_text_index, build_vector_index };
    use crate::db::memory::MemorySampleSource;
    use serde_json::json;

    fn sample(document: Value) -> SampleRecord {
        SampleRecord::new("medical_embeddings", document)
    }

    #[test]
    fn native_sequence_length_is_the_dimension() {
        let record = sample(json!({ "embedding": [0.1, 0.2, 0.3] }));
        assert_eq!(infer_dimension(&record, "embedding").unwrap(), 3);
    }

    #[test]
    fn encoded_text_is_parsed() {
        let record = sample(json!({ "embedding": "[0.1, 0.2, 0.3, 0.4]" }));
        assert_eq!(infer_dimension(&record, "embedding").unwrap(), 4);
    }

    #[test]
    fn encoded_text_accepts_tuples_exponents_and_trailing_comma() {
        assert_eq!(parse_number_sequence("(1, -2.5e-3, 3,)").unwrap(), vec![1.0, -0.0025, 3.0]);
        assert_eq!(parse_number_sequence("  [ 7 ]  ").unwrap(), vec![7.0]);
        assert_eq!(parse_number_sequence("(7,)").unwrap(), vec![7.0]);
    }

    #[test]
    fn parenthesized_scalar_is_not_a_sequence() {
        assert!(parse_number_sequence("(1)").is_err());
        let record = sample(json!({ "embedding": "( 0.5 )" }));
        assert!(matches!(infer_dimension(&record, "embedding"), Err(ForgeError::MalformedEmbedding { .. })));
    }

    #[test]
    fn garbage_text_is_malformed() {
        let record = sample(json!({ "embedding": "not-a-vector" }));
        let err = infer_dimension(&record, "embedding").unwrap_err();
        assert!(matches!(err, ForgeError::MalformedEmbedding { .. }));
        assert!(err.is_soft());
    }

    #[test]
    fn malformed_elements_carry_the_cause() {
        let record = sample(json!({ "embedding": "[0.1, abc]" }));
        match infer_dimension(&record, "embedding").unwrap_err() {
            ForgeError::MalformedEmbedding { field, cause } => {
                assert_eq!(field, "embedding");
                assert!(cause.contains("abc"), "cause was {}", cause);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(parse_number_sequence("[1, nan]").is_err());
        assert!(parse_number_sequence("[,]").is_err());
        assert!(parse_number_sequence("[[1, 2]]").is_err());
    }

    #[test]
    fn non_numeric_native_values_are_malformed() {
        let record = sample(json!({ "embedding": [0.1, "x"], "flag": true }));
        assert!(matches!(infer_dimension(&record, "embedding"), Err(ForgeError::MalformedEmbedding { .. })));
        assert!(matches!(infer_dimension(&record, "flag"), Err(ForgeError::MalformedEmbedding { .. })));
    }

    #[test]
    fn missing_field_is_reported() {
        let record = sample(json!({ "text": "hello" }));
        assert!(matches!(infer_dimension(&record, "embedding"), Err(ForgeError::MissingField(_))));
        let record = sample(json!({ "embedding": null }));
        assert!(matches!(infer_dimension(&record, "embedding"), Err(ForgeError::MissingField(_))));
    }

    #[test]
    fn empty_sequences_are_rejected() {
        let record = sample(json!({ "a": [], "b": "[]" }));
        assert!(matches!(infer_dimension(&record, "a"), Err(ForgeError::EmptyEmbedding(_))));
        assert!(matches!(infer_dimension(&record, "b"), Err(ForgeError::EmptyEmbedding(_))));
    }

    #[test]
    fn apply_dimension_is_idempotent() {
        let mut definition = build_vector_index("c", "v", &["f"], 384).unwrap();
        apply_dimension(&mut definition, 1536).unwrap();
        let once = serde_json::to_vec(&definition).unwrap();
        apply_dimension(&mut definition, 1536).unwrap();
        let twice = serde_json::to_vec(&definition).unwrap();
        assert_eq!(once, twice);
        assert_eq!(definition.num_dimensions(), Some(1536));
    }

    #[test]
    fn apply_dimension_without_vector_field_fails() {
        let mut definition = build_text_index("c", &[("name", None)]).unwrap();
        let err = apply_dimension(&mut definition, 3).unwrap_err();
        assert!(matches!(err, ForgeError::NoVectorFieldPresent(_)));
        assert!(!err.is_soft());
    }

    #[tokio::test]
    async fn reconcile_one_walks_to_applied() {
        let source = MemorySampleSource::new().with_documents(
            "c",
            vec![json!({ "_metadata": {}, "v": [1] }), json!({ "v": "[1, 2, 3]" })]
        );
        let reconciler = Reconciler::new(&source, SampleFilter::excluding_marker("_metadata"));
        let mut definition = build_vector_index("c", "v", &[], 384).unwrap();

        let state = reconciler.reconcile_one("c_index", "c", "v", &mut definition).await.unwrap();
        assert_eq!(state, ReconcileState::Applied(3));
        assert_eq!(definition.num_dimensions(), Some(3));
    }

    #[tokio::test]
    async fn reconcile_one_without_sample_keeps_placeholder() {
        let source = MemorySampleSource::new();
        let reconciler = Reconciler::new(&source, SampleFilter::default());
        let mut definition = build_vector_index("c", "v", &[], 384).unwrap();

        let state = reconciler.reconcile_one("c_index", "c", "v", &mut definition).await.unwrap();
        assert!(matches!(state, ReconcileState::Unapplied(ref r) if r.contains("no qualifying sample")));
        assert_eq!(definition.num_dimensions(), Some(384));
    }
}
