use serde::Serialize;

use crate::config::PublicAppConfig;

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacesHealth {
    pub identifier_cache: CacheHealth,
    pub details_cache: CacheHealth,
    /// Whether the durable store has been opened; a snapshot never opens it.
    pub durable_store_available: bool,
    pub config: PublicAppConfig,
}

impl PlacesHealth {
    pub fn new(
        identifier_cache: CacheHealth,
        details_cache: CacheHealth,
        durable_store_available: bool,
        config: PublicAppConfig,
    ) -> Self {
        Self {
            identifier_cache,
            details_cache,
            durable_store_available,
            config,
        }
    }
}
