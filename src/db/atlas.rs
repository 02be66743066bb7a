use async_trait::async_trait;
use reqwest::{ Client, RequestBuilder };
use serde::Deserialize;
use serde_json::{ json, Value };
use std::{ error::Error, time::Duration };
use log::{ debug, error, info };

use super::{ fetch_error, SampleSource };
use crate::error::{ ForgeError, Result };
use crate::sample::{ SampleFilter, SampleRecord };

const DEFAULT_DATA_SOURCE: &str = "Cluster0";

#[derive(Debug, Deserialize)]
struct FindOneResponse {
    document: Option<Value>,
}

/// Samples documents through the MongoDB Atlas Data API (`/action/findOne`).
pub struct AtlasSampleSource {
    client: Client,
    base_url: String,
    api_key: String,
    data_source: String,
    database: String,
}

impl AtlasSampleSource {
    pub fn new(
        base_url: &str,
        api_key: &str,
        data_source: Option<&str>,
        database: &str
    ) -> Result<Self> {
        if base_url.is_empty() {
            return Err(ForgeError::InvalidConfiguration("Atlas requires a Data API URL".into()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ForgeError::InvalidConfiguration(format!("HTTP client: {}", e)))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let data_source = data_source.unwrap_or(DEFAULT_DATA_SOURCE).to_string();

        info!("Atlas Data API at {}, data source: {}, db: {}", base_url, data_source, database);

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            data_source,
            database: database.to_string(),
        })
    }

    fn build_request(&self, action: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/action/{}", self.base_url, action))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("apiKey", &self.api_key)
    }

    fn find_one_body(&self, collection: &str, filter: &SampleFilter) -> Value {
        json!({
            "dataSource": self.data_source,
            "database": self.database,
            "collection": collection,
            "filter": filter.to_mongo_filter(),
        })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> std::result::Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        let body = self.find_one_body(collection, filter);
        debug!("Atlas findOne on '{}' with filter {}", collection, body["filter"]);

        let resp = self.build_request("findOne").json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!("Atlas findOne failed (Status: {}): {}", status, text);
            return Err(format!("findOne failed (Status: {}): {}", status, text).into());
        }

        let parsed: FindOneResponse = serde_json::from_str(&text)?;
        Ok(parsed.document.filter(|d| !d.is_null()))
    }
}

#[async_trait]
impl SampleSource for AtlasSampleSource {
    async fn fetch_sample(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> Result<Option<SampleRecord>> {
        let document = self
            .find_one(collection, filter).await
            .map_err(|e| fetch_error(collection, e))?;
        Ok(document.map(|d| SampleRecord::new(collection, d)))
    }
}
