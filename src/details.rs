use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{expiry_after, CacheEntry, PlaceCaches};
use crate::errors::{AppError, AppResult};
use crate::models::{FieldMask, Location, LocationDetails, ResolvedIdentifier};
use crate::provider::PlacesProvider;
use crate::resolver::Resolver;
use crate::store::{DurableRow, DurableStore, DurableTier};
use crate::transform::{normalize_durable_row, transform_details, TransformContext};

/// Where a details response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailsSource {
    Memory,
    Durable,
    Provider,
}

pub struct DetailsFetcher {
    provider: Arc<dyn PlacesProvider>,
    resolver: Arc<Resolver>,
    caches: Arc<PlaceCaches>,
    durable: Arc<DurableTier>,
    proxy_base: String,
}

impl DetailsFetcher {
    pub fn new(
        provider: Arc<dyn PlacesProvider>,
        resolver: Arc<Resolver>,
        caches: Arc<PlaceCaches>,
        durable: Arc<DurableTier>,
        proxy_base: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            resolver,
            caches,
            durable,
            proxy_base: proxy_base.into(),
        }
    }

    pub async fn get_details(
        &self,
        location: &Location,
        mask: FieldMask,
    ) -> AppResult<LocationDetails> {
        self.fetch(location, mask).await.map(|(details, _)| details)
    }

    /// In-process cache, then a fresh durable row, then resolution plus a
    /// provider details call. Only successful fetches are cached.
    pub async fn fetch(
        &self,
        location: &Location,
        mask: FieldMask,
    ) -> AppResult<(LocationDetails, DetailsSource)> {
        let now = self.caches.now();
        if let Some(entry) = self.caches.details.get(&location.id, now) {
            if entry.value.field_mask.covers(mask) {
                debug!(location_id = %location.id, "details cache hit");
                return Ok((entry.value, DetailsSource::Memory));
            }
        }

        let store = self.durable.acquire().await;
        let row = match &store {
            Some(store) => load_row(Arc::clone(store), &location.id).await,
            None => None,
        };

        if let Some(row) = &row {
            if now - row.fetched_at < self.caches.details.ttl() {
                match normalize_durable_row(row) {
                    Ok(details) if details.field_mask.covers(mask) => {
                        self.backfill(location, row, &details, now);
                        debug!(location_id = %location.id, "served details from durable store");
                        return Ok((details, DetailsSource::Durable));
                    }
                    Ok(_) => {
                        debug!(location_id = %location.id, mask = mask.as_str(), "durable row lacks requested fields")
                    }
                    Err(err) => warn!(
                        target: "durable_store",
                        location_id = %location.id,
                        error = %err,
                        "ignoring unreadable durable row"
                    ),
                }
            }
        }

        let external_id = self.identifier_for(location, row.as_ref(), now).await?;
        let handle = self.spawn_refresh(location.id.clone(), external_id, mask, store);
        let details = handle
            .await
            .map_err(|err| AppError::Task(err.to_string()))??;
        Ok((details, DetailsSource::Provider))
    }

    async fn identifier_for(
        &self,
        location: &Location,
        row: Option<&DurableRow>,
        now: DateTime<Utc>,
    ) -> AppResult<String> {
        let stored = row
            .map(|row| row.external_id.trim())
            .filter(|id| !id.is_empty());
        if let Some(stored) = stored {
            let cached = self.caches.identifiers.get(&location.id, now).is_some();
            if !cached && location.trusted_external_id().is_none() {
                debug!(location_id = %location.id, external_id = stored, "reusing stored identifier");
                self.resolver
                    .remember(&location.id, ResolvedIdentifier::trusted(stored));
                return Ok(stored.to_string());
            }
        }
        Ok(self.resolver.resolve(location).await?.value.external_id)
    }

    /// Runs the provider call on its own task so an abandoned caller still
    /// warms the cache.
    fn spawn_refresh(
        &self,
        location_id: String,
        external_id: String,
        mask: FieldMask,
        store: Option<Arc<dyn DurableStore>>,
    ) -> JoinHandle<AppResult<LocationDetails>> {
        let provider = Arc::clone(&self.provider);
        let caches = Arc::clone(&self.caches);
        let proxy_base = self.proxy_base.clone();
        tokio::spawn(async move {
            info!(
                location_id = %location_id,
                external_id = %external_id,
                field_mask = mask.as_str(),
                "fetching place details"
            );
            let raw = provider
                .place_details(&external_id, mask.header_value())
                .await?;
            let fetched_at = caches.now();
            let details = transform_details(
                &external_id,
                raw,
                &TransformContext {
                    fetched_at,
                    field_mask: mask,
                    proxy_base: &proxy_base,
                },
            );
            caches.details.insert(&location_id, details.clone(), fetched_at);
            if let Some(store) = store {
                persist_in_background(store, &location_id, &details);
            }
            Ok(details)
        })
    }

    fn backfill(
        &self,
        location: &Location,
        row: &DurableRow,
        details: &LocationDetails,
        now: DateTime<Utc>,
    ) {
        let expires_at = expiry_after(row.fetched_at, self.caches.details.ttl());
        self.caches
            .details
            .insert_entry(&location.id, CacheEntry::new(details.clone(), expires_at), now);
        if self.caches.identifiers.get(&location.id, now).is_none() {
            self.resolver.remember(
                &location.id,
                ResolvedIdentifier::trusted(details.external_id.clone()),
            );
        }
    }
}

async fn load_row(store: Arc<dyn DurableStore>, location_id: &str) -> Option<DurableRow> {
    let key = location_id.to_string();
    match tokio::task::spawn_blocking(move || store.load(&key)).await {
        Ok(Ok(row)) => row,
        Ok(Err(err)) => {
            warn!(
                target: "durable_store",
                location_id,
                error = %err,
                "durable read failed; continuing without it"
            );
            None
        }
        Err(err) => {
            warn!(target: "durable_store", location_id, error = %err, "durable read task failed");
            None
        }
    }
}

/// Fire-and-forget upsert. Failures are logged and never reach the caller.
fn persist_in_background(
    store: Arc<dyn DurableStore>,
    location_id: &str,
    details: &LocationDetails,
) {
    let payload = match serde_json::to_value(details) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(target: "durable_store", location_id, error = %err, "could not serialize details");
            return;
        }
    };
    let row = DurableRow {
        location_id: location_id.to_string(),
        external_id: details.external_id.clone(),
        payload,
        fetched_at: details.fetched_at,
    };
    tokio::task::spawn_blocking(move || {
        if let Err(err) = store.upsert(&row) {
            warn!(
                target: "durable_store",
                location_id = %row.location_id,
                error = %err,
                "durable write failed; details cached in-process only"
            );
        }
    });
}
