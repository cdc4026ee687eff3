use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{Clock, PlaceCaches, SystemClock};
use crate::config::AppConfig;
use crate::details::{DetailsFetcher, DetailsSource};
use crate::errors::{AppError, AppResult};
use crate::health::{CacheHealth, PlacesHealth};
use crate::models::{
    AutocompleteBias, AutocompleteCandidate, Coordinates, FieldMask, Location, LocationDetails,
    ResolvedIdentifier, ResolvedPlace,
};
use crate::photos::PhotoProxy;
use crate::provider::{HttpPlacesClient, PhotoSizeHints, PhotoStream, PlacesProvider};
use crate::resolver::{Resolver, SearchSettings};
use crate::store::DurableTier;
use crate::transform::{location_from_raw, transform_details, TransformContext};

const COORDINATES_FIELD_MASK: &str = "id,location";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentStats {
    pub total: usize,
    pub memory_hits: usize,
    pub durable_hits: usize,
    pub provider_calls: usize,
    pub enriched: usize,
    pub failed: usize,
}

impl EnrichmentStats {
    fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }
}

/// Entry point for the rest of the application.
pub struct PlacesService {
    config: AppConfig,
    provider: Arc<dyn PlacesProvider>,
    caches: Arc<PlaceCaches>,
    resolver: Arc<Resolver>,
    durable: Arc<DurableTier>,
    details: DetailsFetcher,
    photos: PhotoProxy,
}

impl PlacesService {
    /// Fails immediately when the provider credential is missing.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.require_places_api_key()?;
        let provider = Arc::new(HttpPlacesClient::from_config(config)?);
        Ok(Self::with_provider(
            provider,
            config,
            DurableTier::from_config(config),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_provider(
        provider: Arc<dyn PlacesProvider>,
        config: &AppConfig,
        durable: DurableTier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let caches = Arc::new(PlaceCaches::from_config(config, clock));
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&provider),
            Arc::clone(&caches),
            SearchSettings {
                language_code: config.places_language_code.clone(),
                region_code: config.places_region_code.clone(),
                country_hint: config.places_country_hint.clone(),
            },
        ));
        let durable = Arc::new(durable);
        let details = DetailsFetcher::new(
            Arc::clone(&provider),
            Arc::clone(&resolver),
            Arc::clone(&caches),
            Arc::clone(&durable),
            config.photo_proxy_base.clone(),
        );
        let photos = PhotoProxy::new(Arc::clone(&provider), config.photo_proxy_base.clone());
        Self {
            config: config.clone(),
            provider,
            caches,
            resolver,
            durable,
            details,
            photos,
        }
    }

    /// Slim-mask details for display paths.
    pub async fn get_details(&self, location: &Location) -> AppResult<LocationDetails> {
        self.details.get_details(location, FieldMask::Display).await
    }

    pub async fn get_full_details(&self, location: &Location) -> AppResult<LocationDetails> {
        self.details.get_details(location, FieldMask::Full).await
    }

    /// Like [`Self::get_details`], but logs failures and returns `None` so a
    /// view can render with degraded fields.
    pub async fn get_details_lossy(&self, location: &Location) -> Option<LocationDetails> {
        match self.get_details(location).await {
            Ok(details) => Some(details),
            Err(err) if err.is_resolution_failure() => {
                warn!(location_id = %location.id, error = %err, "location has no resolvable identity");
                None
            }
            Err(err) => {
                warn!(location_id = %location.id, ?err, "details unavailable");
                None
            }
        }
    }

    pub async fn can_resolve_identifier(&self, location: &Location) -> bool {
        self.resolver.can_resolve(location).await
    }

    pub async fn stream_photo(
        &self,
        reference: &str,
        hints: PhotoSizeHints,
    ) -> AppResult<PhotoStream> {
        self.photos.stream_photo(reference, hints).await
    }

    pub async fn stream_photo_token(
        &self,
        token: &str,
        hints: PhotoSizeHints,
    ) -> AppResult<PhotoStream> {
        self.photos.stream_photo_token(token, hints).await
    }

    pub async fn resolve_autocomplete(
        &self,
        input: &str,
        bias: AutocompleteBias,
    ) -> AppResult<Vec<AutocompleteCandidate>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let mut bias = bias;
        if bias.language_code.is_none() {
            bias.language_code = Some(self.config.places_language_code.clone());
        }
        if bias.region_codes.is_empty() {
            bias.region_codes.extend(self.config.places_region_code.clone());
        }
        let candidates = self.provider.autocomplete(input, &bias).await?;
        debug!(input, candidates = candidates.len(), "autocomplete");
        Ok(candidates)
    }

    pub async fn fetch_coordinates_by_identifier(
        &self,
        external_id: &str,
    ) -> AppResult<Option<Coordinates>> {
        let now = self.caches.now();
        if let Some(coordinates) = self
            .caches
            .details
            .get(&adhoc_location_id(external_id), now)
            .and_then(|entry| entry.value.coordinates)
        {
            return Ok(Some(coordinates));
        }
        let raw = match self
            .provider
            .place_details(external_id, COORDINATES_FIELD_MASK)
            .await
        {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(raw.location.and_then(|location| {
            Some(Coordinates {
                lat: location.latitude?,
                lng: location.longitude?,
            })
        }))
    }

    /// Ad-hoc lookup for a place with no internal record. The result is cached
    /// under the synthesized location so follow-up calls stay local.
    pub async fn fetch_full_details_by_identifier(
        &self,
        external_id: &str,
    ) -> AppResult<Option<ResolvedPlace>> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Ok(None);
        }
        let raw = match self
            .provider
            .place_details(external_id, FieldMask::Full.header_value())
            .await
        {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => {
                info!(external_id, "ad-hoc place lookup found nothing");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let location = location_from_raw(external_id, &raw);
        let fetched_at = self.caches.now();
        let details = transform_details(
            external_id,
            raw,
            &TransformContext {
                fetched_at,
                field_mask: FieldMask::Full,
                proxy_base: &self.config.photo_proxy_base,
            },
        );
        self.caches
            .details
            .insert(&location.id, details.clone(), fetched_at);
        self.resolver
            .remember(&location.id, ResolvedIdentifier::trusted(external_id));
        Ok(Some(ResolvedPlace { location, details }))
    }

    /// Full-mask details for a batch, one location at a time. Failures are
    /// logged and counted.
    pub async fn enrich_locations(&self, locations: &[Location]) -> EnrichmentStats {
        let mut stats = EnrichmentStats::with_total(locations.len());
        for location in locations {
            match self.details.fetch(location, FieldMask::Full).await {
                Ok((_, source)) => {
                    match source {
                        DetailsSource::Memory => stats.memory_hits += 1,
                        DetailsSource::Durable => stats.durable_hits += 1,
                        DetailsSource::Provider => stats.provider_calls += 1,
                    }
                    stats.enriched += 1;
                }
                Err(err) => {
                    log_enrichment_failure(location, &err);
                    stats.failed += 1;
                }
            }
        }
        info!(
            total = stats.total,
            enriched = stats.enriched,
            failed = stats.failed,
            provider_calls = stats.provider_calls,
            "location enrichment finished"
        );
        stats
    }

    pub fn health(&self) -> PlacesHealth {
        PlacesHealth::new(
            CacheHealth {
                entries: self.caches.identifiers.len(),
                capacity: self.caches.identifiers.capacity(),
                ttl_secs: self.caches.identifiers.ttl().num_seconds(),
            },
            CacheHealth {
                entries: self.caches.details.len(),
                capacity: self.caches.details.capacity(),
                ttl_secs: self.caches.details.ttl().num_seconds(),
            },
            self.durable.is_open(),
            self.config.public_profile(),
        )
    }
}

fn adhoc_location_id(external_id: &str) -> String {
    format!("place:{external_id}")
}

fn log_enrichment_failure(location: &Location, err: &AppError) {
    if err.is_resolution_failure() {
        warn!(location_id = %location.id, error = %err, "flagging location for curation");
    } else {
        warn!(location_id = %location.id, transient = err.is_transient(), ?err, "enrichment failed");
    }
}
