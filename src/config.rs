//! Explicit store configuration.

use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{KvError, Result};
use crate::keyvalue::{KeyValue, TypedKeyValue};
use crate::naive::{MemoryNaiveKeyValue, NaiveKeyValue};

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Only read by the redis backend. Defaults to [`DEFAULT_REDIS_URL`].
    pub redis_url: Option<String>,
    /// Namespace every key as `prefix:key`.
    pub key_prefix: Option<String>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    #[cfg(feature = "redis-backend")]
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            backend: Backend::Redis,
            redis_url: Some(url.into()),
            key_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Build the store this configuration describes.
    pub fn open(&self) -> Result<Arc<dyn KeyValue>> {
        let naive: Arc<dyn NaiveKeyValue> = match self.backend {
            Backend::Memory => {
                if self.redis_url.is_some() {
                    tracing::warn!("redis url ignored by the memory backend");
                }
                Arc::new(MemoryNaiveKeyValue::new())
            }
            #[cfg(feature = "redis-backend")]
            Backend::Redis => {
                let url = self.redis_url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
                Arc::new(crate::naive::RedisNaiveKeyValue::open(url)?)
            }
        };
        let store = TypedKeyValue::new(naive);
        Ok(match self.key_prefix.as_deref() {
            Some("") => {
                return Err(KvError::Config("key prefix must not be empty".into()));
            }
            Some(prefix) => store.with_prefix(prefix),
            None => Arc::new(store),
        })
    }
}
