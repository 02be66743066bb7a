use redis::aio::MultiplexedConnection;
use redis::{ Client, RedisError, cmd };
use serde_json::Value;
use std::error::Error;
use async_trait::async_trait;
use log::{ info, debug, warn };

use super::{ fetch_error, SampleSource };
use crate::error::{ ForgeError, Result };
use crate::sample::{ SampleFilter, SampleRecord };

const SCAN_BATCH: usize = 100;
const MAX_KEYS_INSPECTED: usize = 1000;

/// Samples RedisJSON documents stored under `item:<collection>:<id>`.
pub struct RedisSampleSource {
    client: Client,
}

impl RedisSampleSource {
    pub fn new(host: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", host);
        let client = Client::open(host).map_err(|e| {
            ForgeError::InvalidConfiguration(format!("Redis URL '{}': {}", host, e))
        })?;
        Ok(Self { client })
    }

    pub async fn get_connection(&self) -> std::result::Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    pub fn key_pattern(collection: &str) -> String {
        format!("item:{}:*", collection)
    }

    /// Parses one `JSON.GET` reply and applies the sample filter.
    fn qualifying_document(key: &str, raw: Option<String>, filter: &SampleFilter) -> Option<Value> {
        let raw = raw?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(doc) if filter.accepts(&doc) => Some(doc),
            Ok(_) => {
                debug!("Key '{}' excluded by sample filter", key);
                None
            }
            Err(e) => {
                warn!("Failed to parse JSON for {}: {}", key, e);
                None
            }
        }
    }

    /// Walks `SCAN` one batch at a time and stops at the first qualifying document,
    /// giving up after [`MAX_KEYS_INSPECTED`] keys.
    async fn first_qualifying(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> std::result::Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        let mut con = self.get_connection().await?;
        let pattern = Self::key_pattern(collection);
        let mut cursor: u64 = 0;
        let mut inspected = 0usize;
        debug!("Scanning Redis keys with pattern: {}", pattern);

        loop {
            let (next_cursor, mut batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut con).await?;
            batch.sort();

            for key in batch {
                if inspected >= MAX_KEYS_INSPECTED {
                    warn!("No qualifying sample among the first {} keys matching '{}'", inspected, pattern);
                    return Ok(None);
                }
                inspected += 1;
                let raw: Option<String> = cmd("JSON.GET").arg(&key).query_async(&mut con).await?;
                if let Some(doc) = Self::qualifying_document(&key, raw, filter) {
                    debug!("Using sample key '{}' for collection '{}'", key, collection);
                    return Ok(Some(doc));
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        if inspected == 0 {
            warn!("No keys found matching '{}'", pattern);
        }
        Ok(None)
    }
}

#[async_trait]
impl SampleSource for RedisSampleSource {
    async fn fetch_sample(
        &self,
        collection: &str,
        filter: &SampleFilter
    ) -> Result<Option<SampleRecord>> {
        let document = self
            .first_qualifying(collection, filter).await
            .map_err(|e| fetch_error(collection, e))?;
        Ok(document.map(|d| SampleRecord::new(collection, d)))
    }
}
