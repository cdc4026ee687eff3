use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{IdentifierCacheEntry, PlaceCaches};
use crate::errors::{AppError, AppResult};
use crate::models::{Location, ResolvedIdentifier};
use crate::provider::{PlacesProvider, TextSearchRequest};

#[derive(Debug, Clone, Default)]
pub struct SearchSettings {
    pub language_code: String,
    pub region_code: Option<String>,
    pub country_hint: Option<String>,
}

/// Turns internal location records into provider identifiers.
pub struct Resolver {
    provider: Arc<dyn PlacesProvider>,
    caches: Arc<PlaceCaches>,
    search: SearchSettings,
}

impl Resolver {
    pub fn new(
        provider: Arc<dyn PlacesProvider>,
        caches: Arc<PlaceCaches>,
        search: SearchSettings,
    ) -> Self {
        Self {
            provider,
            caches,
            search,
        }
    }

    /// Cache, then a curated identifier on the record (trusted without a
    /// network call), then a single-result text search. Failures are never
    /// cached.
    pub async fn resolve(&self, location: &Location) -> AppResult<IdentifierCacheEntry> {
        let now = self.caches.now();
        if let Some(entry) = self.caches.identifiers.get(&location.id, now) {
            debug!(location_id = %location.id, "identifier cache hit");
            return Ok(entry);
        }

        if let Some(external_id) = location.trusted_external_id() {
            debug!(location_id = %location.id, external_id, "trusting curated identifier");
            return Ok(self.remember(&location.id, ResolvedIdentifier::trusted(external_id)));
        }

        let query = build_search_query(location, self.search.country_hint.as_deref());
        let request = TextSearchRequest {
            query: query.clone(),
            language_code: self.search.language_code.clone(),
            region_code: self.search.region_code.clone(),
            page_size: 1,
        };
        let candidate = self
            .provider
            .text_search(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ResolutionFailed {
                location_id: location.id.clone(),
                query: query.clone(),
            })?;

        info!(
            location_id = %location.id,
            external_id = %candidate.external_id,
            "resolved location via text search"
        );
        Ok(self.remember(
            &location.id,
            ResolvedIdentifier {
                external_id: candidate.external_id,
                matched_name: candidate.display_name,
                formatted_address: candidate.formatted_address,
            },
        ))
    }

    /// Non-throwing check for data-quality audits.
    pub async fn can_resolve(&self, location: &Location) -> bool {
        match self.resolve(location).await {
            Ok(_) => true,
            Err(err) if err.is_resolution_failure() => false,
            Err(err) => {
                warn!(location_id = %location.id, ?err, "identifier check failed");
                false
            }
        }
    }

    /// Records an identifier learned elsewhere, e.g. from a durable row.
    pub fn remember(&self, location_id: &str, resolved: ResolvedIdentifier) -> IdentifierCacheEntry {
        let now = self.caches.now();
        self.caches.identifiers.insert(location_id, resolved, now)
    }
}

pub fn build_search_query(location: &Location, country_hint: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in [
        location.name.as_str(),
        location.city.as_str(),
        location.region.as_str(),
        country_hint.unwrap_or_default(),
    ] {
        let part = part.trim();
        if !part.is_empty() && !parts.iter().any(|seen| seen.eq_ignore_ascii_case(part)) {
            parts.push(part);
        }
    }
    parts.join(", ")
}
