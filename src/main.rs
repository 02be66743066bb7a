use std::env;
use std::error::Error;
use log::{ error, info, warn };

use search_index_forge::{
    generate_index_definitions,
    get_store_type,
    ForgeConfig,
    ReconcileStatus,
    SampleFilter,
    SampleStoreConfig,
};

const DEFAULT_OUTPUT: &str = "index_definitions.json";

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn config_from_env() -> Result<ForgeConfig, Box<dyn Error + Send + Sync>> {
    let store_type = get_store_type(&env_opt("INDEX_FORGE_STORE").unwrap_or_else(|| "memory".into()))?;
    let store = SampleStoreConfig {
        store_type,
        host: env_opt("INDEX_FORGE_HOST").unwrap_or_default(),
        api_key: env_opt("INDEX_FORGE_API_KEY"),
        data_source: env_opt("INDEX_FORGE_DATA_SOURCE"),
        database: env_opt("INDEX_FORGE_DATABASE"),
    };

    let mut config = ForgeConfig::default().with_store(store);
    if let Some(path) = env_opt("INDEX_FORGE_CATALOG") {
        config = config.with_catalog_file(&path)?;
    }
    if let Some(marker) = env_opt("INDEX_FORGE_MARKER") {
        config.sample_filter = SampleFilter::excluding_marker(marker);
    }
    if let Some(dim) = env_opt("INDEX_FORGE_DIMENSION") {
        config.placeholder_dimension = dim
            .parse()
            .map_err(|e| format!("INDEX_FORGE_DIMENSION '{}': {}", dim, e))?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    let config = config_from_env()?;

    let artifact = match generate_index_definitions(&config).await {
        Ok(artifact) => artifact,
        Err(e) => {
            error!("Index generation failed: {}", e);
            return Err(e.into());
        }
    };

    for entry in &artifact.entries {
        match &entry.status {
            ReconcileStatus::Applied { dimension } =>
                info!("{} ({}): numDimensions = {}", entry.index.name, entry.collection, dimension),
            ReconcileStatus::Unapplied { reason } =>
                warn!("{} ({}): placeholder dimension kept, {}", entry.index.name, entry.collection, reason),
            ReconcileStatus::NotApplicable => info!("{} ({}): text search", entry.index.name, entry.collection),
        }
    }

    artifact.write_artifact(&output_path)?;
    if !artifact.rejected.is_empty() {
        let keys: Vec<&str> = artifact.rejected
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        for r in &artifact.rejected {
            error!("Catalog entry '{}' rejected: {}", r.key, r.reason);
        }
        return Err(format!("{} catalog entries rejected: {}", keys.len(), keys.join(", ")).into());
    }
    if !artifact.is_fully_reconciled() {
        warn!("Some vector indexes carry an unverified dimension; review before provisioning.");
    }
    Ok(())
}
