pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod sample;
pub mod schema;
pub use builder::{ build_catalog, build_text_index, build_vector_index, default_catalog, CollectionSpec };
pub use config::ForgeConfig;
pub use db::{ SampleSource, create_sample_source, get_store_type, StoreType, SampleStoreConfig };
pub use error::{ ForgeError, Result };
pub use reconcile::{ apply_dimension, infer_dimension, EmbeddingValue, Reconciler };
pub use sample::{ SampleFilter, SampleRecord };
pub use schema::{ IndexArtifact, IndexDefinition, ReconcileStatus, RejectedEntry };

use log::{ info, warn };

/// Builds the catalog's definitions and reconciles their dimensions against `source`.
pub async fn run_with_source(source: &dyn SampleSource, config: &ForgeConfig) -> Result<IndexArtifact> {
    let build = build_catalog(&config.catalog, config.placeholder_dimension);
    info!("Built {} index definitions ({} rejected)", build.built.len(), build.rejected.len());

    let reconciler = Reconciler::new(source, config.sample_filter.clone());
    reconciler.reconcile(build).await
}

/// Opens the configured sample source, runs generation, and closes the source whatever the outcome.
pub async fn generate_index_definitions(config: &ForgeConfig) -> Result<IndexArtifact> {
    let source = create_sample_source(&config.store).await?;
    let result = run_with_source(source.as_ref(), config).await;
    if let Err(e) = source.close().await {
        warn!("Failed to close sample source: {}", e);
    }
    result
}
