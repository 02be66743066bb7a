use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use log::{ debug, info };

use super::SampleSource;
use crate::error::{ ForgeError, Result };
use crate::sample::{ SampleFilter, SampleRecord };

/// Documents held in process, keyed by collection. Backs tests and offline fixture runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySampleSource {
    collections: HashMap<String, Vec<Value>>,
}

impl MemorySampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(mut self, collection: &str, documents: Vec<Value>) -> Self {
        self.collections.entry(collection.to_string()).or_default().extend(documents);
        self
    }

    /// Loads a fixture of the form `{"<collection>": [<document>, ...], ...}`.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let collections: HashMap<String, Vec<Value>> = serde_json::from_str(&raw)?;
        if collections.is_empty() {
            return Err(
                ForgeError::InvalidConfiguration(format!("fixture '{}' has no collections", path))
            );
        }
        info!("Loaded {} fixture collections from {}", collections.len(), path);
        Ok(Self { collections })
    }
}

#[async_trait]
impl SampleSource for MemorySampleSource {
    async fn fetch_sample(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> Result<Option<SampleRecord>> {
        let sample = self.collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.accepts(d)))
            .map(|d| SampleRecord::new(collection, d.clone()));
        debug!("Memory sample for '{}': {}", collection, if sample.is_some() { "found" } else { "none" });
        Ok(sample)
    }
}
