use crate::builder::{ default_catalog, load_catalog, CollectionSpec, DEFAULT_DIMENSION };
use crate::db::SampleStoreConfig;
use crate::error::Result;
use crate::sample::{ SampleFilter, DEFAULT_MARKER_FIELD };

/// Everything a generation run needs.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub store: SampleStoreConfig,
    /// Dimension declared before reconciliation, and kept when no sample confirms one.
    pub placeholder_dimension: usize,
    pub sample_filter: SampleFilter,
    pub catalog: Vec<CollectionSpec>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            store: SampleStoreConfig::default(),
            placeholder_dimension: DEFAULT_DIMENSION,
            sample_filter: SampleFilter::excluding_marker(DEFAULT_MARKER_FIELD),
            catalog: default_catalog(),
        }
    }
}

impl ForgeConfig {
    pub fn with_store(mut self, store: SampleStoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_catalog_file(mut self, path: &str) -> Result<Self> {
        self.catalog = load_catalog(path)?;
        Ok(self)
    }
}
