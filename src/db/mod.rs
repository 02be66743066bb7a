pub mod atlas;
pub mod memory;
pub mod redis;
use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;
use log::info;

use crate::error::{ ForgeError, Result };
use crate::sample::{ SampleFilter, SampleRecord };

/// Read access to stored documents, used only to draw samples.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Returns at most one document of `collection` accepted by `filter`.
    async fn fetch_sample(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> Result<Option<SampleRecord>>;

    /// Releases the underlying connection. Called once at the end of a run.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn fetch_error(
    collection: &str,
    source: Box<dyn Error + Send + Sync>
) -> ForgeError {
    ForgeError::SampleFetch { collection: collection.to_string(), source }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreType {
    Atlas,
    Redis,
    Memory,
}

#[derive(Clone, Debug)]
pub struct SampleStoreConfig {
    pub store_type: StoreType,
    /// Data API base URL for Atlas, connection URL for Redis, fixture file path for Memory.
    pub host: String,
    pub api_key: Option<String>,
    pub data_source: Option<String>,
    pub database: Option<String>,
}

impl Default for SampleStoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            host: String::new(),
            api_key: None,
            data_source: None,
            database: None,
        }
    }
}

pub async fn create_sample_source(config: &SampleStoreConfig) -> Result<Arc<dyn SampleSource>> {
    info!("Creating sample source of type: {:?}", config.store_type);
    match config.store_type {
        StoreType::Atlas => {
            let api_key = config.api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    ForgeError::InvalidConfiguration("Atlas requires an API key".into())
                })?;
            let database = config.database.as_deref().ok_or_else(|| {
                ForgeError::InvalidConfiguration("Atlas requires a database name".into())
            })?;
            let store = atlas::AtlasSampleSource::new(
                &config.host,
                api_key,
                config.data_source.as_deref(),
                database
            )?;
            Ok(Arc::new(store))
        }
        StoreType::Redis => {
            let store = redis::RedisSampleSource::new(&config.host)?;
            Ok(Arc::new(store))
        }
        StoreType::Memory => {
            let store = if config.host.is_empty() {
                memory::MemorySampleSource::new()
            } else {
                memory::MemorySampleSource::from_json_file(&config.host)?
            };
            Ok(Arc::new(store))
        }
    }
}

pub fn get_store_type(type_str: &str) -> std::result::Result<StoreType, String> {
    match type_str.to_lowercase().as_str() {
        "atlas" | "mongodb" | "mongo" => Ok(StoreType::Atlas),
        "redis" => Ok(StoreType::Redis),
        "memory" | "file" => Ok(StoreType::Memory),
        _ => Err(format!("Unsupported sample store type: {}", type_str)),
    }
}
