use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForgeError>;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Invalid index configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Embedding field '{0}' not present in sample document")]
    MissingField(String),

    #[error("Malformed embedding in field '{field}': {cause}")]
    MalformedEmbedding {
        field: String,
        cause: String,
    },

    #[error("Embedding in field '{0}' has zero length")]
    EmptyEmbedding(String),

    #[error("Index definition '{0}' has no vector field")]
    NoVectorFieldPresent(String),

    #[error("Failed to fetch sample from collection '{collection}': {source}")]
    SampleFetch {
        collection: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForgeError {
    /// Soft failures are recorded against a single collection and never abort the run.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ForgeError::MissingField(_) |
                ForgeError::MalformedEmbedding { .. } |
                ForgeError::EmptyEmbedding(_) |
                ForgeError::SampleFetch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_failures_are_soft() {
        assert!(ForgeError::MissingField("embedding".into()).is_soft());
        assert!(ForgeError::EmptyEmbedding("embedding".into()).is_soft());
        assert!(
            (ForgeError::MalformedEmbedding {
                field: "embedding".into(),
                cause: "bad".into(),
            }).is_soft()
        );
    }

    #[test]
    fn contract_violations_are_fatal() {
        assert!(!ForgeError::NoVectorFieldPresent("drug_search_index".into()).is_soft());
        assert!(!ForgeError::InvalidConfiguration("empty".into()).is_soft());
    }
}
