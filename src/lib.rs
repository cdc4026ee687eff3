mod cache;
mod categories;
mod config;
mod details;
mod errors;
mod health;
mod models;
mod photos;
mod provider;
mod resolver;
mod service;
mod store;
mod transform;

#[cfg(test)]
mod test_support;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::{CacheEntry, Clock, DetailsCacheEntry, IdentifierCacheEntry, SystemClock, TtlCache};
pub use categories::{map_place_type, CategoryMatch, LocationCategory};
pub use config::{AppConfig, PublicAppConfig};
pub use details::DetailsSource;
pub use errors::{AppError, AppResult};
pub use health::{CacheHealth, PlacesHealth};
pub use models::{
    AutocompleteBias, AutocompleteCandidate, Coordinates, DayTime, FieldMask, Location,
    LocationDetails, OpeningPeriod, Photo, PhotoAttribution, ResolvedIdentifier, ResolvedPlace,
    Review, MAX_PHOTOS, MAX_REVIEWS,
};
pub use photos::{decode_photo_token, encode_photo_token, proxy_url, PhotoProxy};
pub use provider::{
    HttpPlacesClient, PhotoSizeHints, PhotoStream, PlacesProvider, RawPlace, SearchCandidate,
    TextSearchRequest,
};
pub use resolver::build_search_query;
pub use service::{EnrichmentStats, PlacesService};
pub use store::{DurableRow, DurableStore, DurableTier, SqliteDetailsStore};

/// Installs the global subscriber once; later calls are no-ops.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,trip_places=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
