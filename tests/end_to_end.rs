use async_trait::async_trait;
use serde_json::{ json, Value };

use search_index_forge::builder::IndexShape;
use search_index_forge::db::memory::MemorySampleSource;
use search_index_forge::{
    default_catalog,
    run_with_source,
    CollectionSpec,
    ForgeConfig,
    ForgeError,
    ReconcileStatus,
    SampleFilter,
    SampleRecord,
    SampleSource,
};

const PLACEHOLDER: usize = 1536;

fn vector_spec(key: &str, collection: &str) -> CollectionSpec {
    CollectionSpec {
        key: key.to_string(),
        collection: collection.to_string(),
        alias: None,
        index: IndexShape::Vector {
            vector_path: "embedding".into(),
            filter_paths: vec!["medical_specialty".into()],
            sample_field: None,
            dimension_from: None,
        },
    }
}

fn embedding(dim: usize) -> Value {
    json!(vec![0.01_f64; dim])
}

fn three_collection_config() -> ForgeConfig {
    ForgeConfig {
        placeholder_dimension: PLACEHOLDER,
        catalog: vec![
            vector_spec("good", "with_sample"),
            vector_spec("empty", "only_markers"),
            vector_spec("broken", "garbled")
        ],
        ..ForgeConfig::default()
    }
}

fn three_collection_source() -> MemorySampleSource {
    MemorySampleSource::new()
        .with_documents("with_sample", vec![json!({ "embedding": embedding(384) })])
        .with_documents(
            "only_markers",
            vec![json!({ "_metadata": { "migrated": true }, "embedding": embedding(8) })]
        )
        .with_documents("garbled", vec![json!({ "embedding": "[0.1, 0.2, oops]" })])
}

#[tokio::test]
async fn one_applied_two_unapplied() {
    let artifact = run_with_source(&three_collection_source(), &three_collection_config()).await.unwrap();

    assert_eq!(artifact.entries.len(), 3);
    let applied: Vec<_> = artifact.entries
        .iter()
        .filter(|e| matches!(e.status, ReconcileStatus::Applied { .. }))
        .collect();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].key, "good");
    assert_eq!(applied[0].index.num_dimensions(), Some(384));

    for key in ["empty", "broken"] {
        let entry = artifact.get(key).unwrap();
        assert_eq!(entry.index.num_dimensions(), Some(PLACEHOLDER));
        match &entry.status {
            ReconcileStatus::Unapplied { reason } => assert!(!reason.is_empty()),
            other => panic!("{} should be unapplied, got {:?}", key, other),
        }
    }
    assert!(!artifact.is_fully_reconciled());
    assert_eq!(artifact.unapplied().count(), 2);
}

#[tokio::test]
async fn missing_and_empty_embeddings_stay_unapplied() {
    let source = MemorySampleSource::new()
        .with_documents("no_field", vec![json!({ "text": "fever in infants" })])
        .with_documents("zero_width", vec![json!({ "embedding": "[]" })]);
    let config = ForgeConfig {
        placeholder_dimension: PLACEHOLDER,
        catalog: vec![vector_spec("missing", "no_field"), vector_spec("empty", "zero_width")],
        ..ForgeConfig::default()
    };

    let artifact = run_with_source(&source, &config).await.unwrap();

    let missing = artifact.get("missing").unwrap();
    assert_eq!(missing.index.num_dimensions(), Some(PLACEHOLDER));
    match &missing.status {
        ReconcileStatus::Unapplied { reason } => assert!(reason.contains("not present"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }

    let empty = artifact.get("empty").unwrap();
    assert_eq!(empty.index.num_dimensions(), Some(PLACEHOLDER));
    match &empty.status {
        ReconcileStatus::Unapplied { reason } => assert!(reason.contains("zero length"), "{}", reason),
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn rejected_catalog_entry_is_reported_in_the_artifact() {
    let mut config = ForgeConfig::default();
    config.catalog[0].collection = String::new();
    let source = MemorySampleSource::new().with_documents(
        "godzilla_medical_dataset",
        vec![json!({ "text_embedding": embedding(384) })]
    );

    let artifact = run_with_source(&source, &config).await.unwrap();

    assert!(artifact.get("medical_embeddings_index").is_none());
    let rejection = artifact.rejection("medical_embeddings_index").unwrap();
    assert!(rejection.reason.contains("collection name"), "{}", rejection.reason);
    assert!(!artifact.is_fully_reconciled());

    let godzilla = artifact.get("godzilla_index").unwrap();
    assert_eq!(godzilla.index.num_dimensions(), Some(384));
    match &godzilla.status {
        ReconcileStatus::Unapplied { reason } => {
            assert!(reason.contains("'medical_embeddings_index' was rejected"), "{}", reason)
        }
        other => panic!("unexpected status {:?}", other),
    }

    let value = serde_json::to_value(&artifact).unwrap();
    assert_eq!(value["rejected"][0]["key"], "medical_embeddings_index");
    assert!(value["indexes"].get("drug_search_index").is_some());
}

#[tokio::test]
async fn zero_placeholder_rejects_vector_entries_only() {
    let config = ForgeConfig { placeholder_dimension: 0, ..ForgeConfig::default() };

    let artifact = run_with_source(&MemorySampleSource::new(), &config).await.unwrap();

    let rejected: Vec<_> = artifact.rejected
        .iter()
        .map(|r| r.key.as_str())
        .collect();
    assert_eq!(rejected, vec!["medical_embeddings_index", "godzilla_index"]);
    assert!(artifact.get("drug_search_index").is_some());
}

#[tokio::test]
async fn reconciling_twice_gives_identical_output() {
    let source = three_collection_source();
    let config = three_collection_config();

    let first = run_with_source(&source, &config).await.unwrap();
    let second = run_with_source(&source, &config).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn default_catalog_shares_the_medical_dimension() {
    let source = MemorySampleSource::new().with_documents(
        "medical_embeddings",
        vec![
            json!({ "_metadata": { "source": "supabase" } }),
            json!({ "embedding": "[0.5, 0.25, 0.125, 0.0625, 1.0]", "medical_specialty": "cardiology" })
        ]
    );

    let artifact = run_with_source(&source, &ForgeConfig::default()).await.unwrap();
    let definitions = artifact.definitions_json().unwrap();

    assert_eq!(
        definitions["medical_embeddings_index"]["definition"]["fields"][0]["numDimensions"],
        5
    );
    assert_eq!(definitions["godzilla_index"]["definition"]["fields"][0]["numDimensions"], 5);
    assert_eq!(definitions["godzilla_index"]["name"], "vector_index_godzilla");
    assert_eq!(definitions["drug_search_index"]["type"], "search");
    assert_eq!(definitions["drug_search_index"]["definition"]["mappings"]["dynamic"], false);
    assert_eq!(
        artifact.get("drug_search_index").unwrap().status,
        ReconcileStatus::NotApplicable
    );
    assert!(artifact.is_fully_reconciled());
}

#[tokio::test]
async fn unresolved_upstream_leaves_dependent_unapplied() {
    let artifact = run_with_source(&MemorySampleSource::new(), &ForgeConfig::default()).await.unwrap();

    let godzilla = artifact.get("godzilla_index").unwrap();
    assert_eq!(godzilla.index.num_dimensions(), Some(384));
    match &godzilla.status {
        ReconcileStatus::Unapplied { reason } => assert!(reason.contains("medical_embeddings_index")),
        other => panic!("unexpected status {:?}", other),
    }
}

struct FailingSource;

#[async_trait]
impl SampleSource for FailingSource {
    async fn fetch_sample(
        &self,
        collection: &str,
        _filter: &SampleFilter
    ) -> search_index_forge::Result<Option<SampleRecord>> {
        Err(ForgeError::SampleFetch {
            collection: collection.to_string(),
            source: "connection refused".into(),
        })
    }
}

#[tokio::test]
async fn fetch_errors_do_not_abort_the_run() {
    let artifact = run_with_source(&FailingSource, &three_collection_config()).await.unwrap();

    assert_eq!(artifact.entries.len(), 3);
    for entry in &artifact.entries {
        match &entry.status {
            ReconcileStatus::Unapplied { reason } => assert!(reason.contains("connection refused")),
            other => panic!("unexpected status {:?}", other),
        }
    }
}

#[tokio::test]
async fn default_catalog_emits_all_three_keys_in_order() {
    let artifact = run_with_source(&MemorySampleSource::new(), &ForgeConfig::default()).await.unwrap();
    let keys: Vec<_> = artifact.definitions().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["medical_embeddings_index", "godzilla_index", "drug_search_index"]);
    assert_eq!(default_catalog().len(), keys.len());
}
