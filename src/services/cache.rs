// src/services/cache.rs
use crate::errors::SkinReportError;
use async_trait::async_trait;
use log::debug;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// String-valued store for page analyses and finished reports.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SkinReportError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), SkinReportError>;
}

pub fn page_key(schema_version: &str, fingerprint: &str) -> String {
    format!("page:{}:{}", schema_version, fingerprint)
}

pub fn report_key(id: &uuid::Uuid) -> String {
    format!("report:{}", id)
}

/// Entry ceiling for the in-process cache.
pub const MEMORY_CACHE_CAPACITY: usize = 1024;

pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(MEMORY_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SkinReportError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires)) if *expires > Instant::now() => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => {}
            }
        }
        // Expired
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), SkinReportError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires)| *expires > now);

        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let soonest = entries
                .iter()
                .min_by_key(|(_, (_, expires))| *expires)
                .map(|(k, _)| k.clone());
            if let Some(evicted) = soonest {
                debug!("Memory cache full, evicting {}", evicted);
                entries.remove(&evicted);
            }
        }

        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }
}

pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self, SkinReportError> {
        let client = Client::open(redis_url).map_err(|e| SkinReportError::Cache(e.to_string()))?;

        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AnalysisCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, SkinReportError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))?;

        conn.get(key)
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), SkinReportError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))?;

        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1) as usize)
            .await
            .map_err(|e| SkinReportError::Cache(e.to_string()))
    }
}
