use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

const DEFAULT_PLACES_API_BASE: &str = "https://places.googleapis.com/v1";
const DEFAULT_IDENTIFIER_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_DETAILS_TTL_SECS: u64 = 6 * 60 * 60;
/// Upper bound for any configured TTL (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
const DEFAULT_IDENTIFIER_CACHE_CAPACITY: usize = 10_000;
const DEFAULT_DETAILS_CACHE_CAPACITY: usize = 2_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub google_places_api_key: Option<SecretString>,
    pub places_api_base: String,
    pub places_language_code: String,
    pub places_region_code: Option<String>,
    pub places_country_hint: Option<String>,
    pub request_timeout_ms: u64,
    pub identifier_ttl_secs: u64,
    pub details_ttl_secs: u64,
    pub identifier_cache_capacity: usize,
    pub details_cache_capacity: usize,
    pub details_store_path: Option<PathBuf>,
    pub photo_proxy_base: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub places_api_base: String,
    pub places_language_code: String,
    pub places_region_code: Option<String>,
    pub request_timeout_ms: u64,
    pub identifier_ttl_secs: u64,
    pub details_ttl_secs: u64,
    pub identifier_cache_capacity: usize,
    pub details_cache_capacity: usize,
    pub details_store_path: Option<String>,
    pub photo_proxy_base: String,
    pub has_google_places_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            places_api_base: env::var("PLACES_API_BASE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PLACES_API_BASE.to_string()),
            places_language_code: env::var("PLACES_LANGUAGE_CODE")
                .unwrap_or_else(|_| "en".to_string()),
            places_region_code: parse_optional("PLACES_REGION_CODE", "jp"),
            places_country_hint: parse_optional("PLACES_COUNTRY_HINT", "Japan"),
            request_timeout_ms: parse_u64("PLACES_REQUEST_TIMEOUT_MS", 10_000).max(1),
            identifier_ttl_secs: parse_u64("PLACES_IDENTIFIER_TTL_SECS", DEFAULT_IDENTIFIER_TTL_SECS)
                .min(MAX_TTL_SECS),
            details_ttl_secs: parse_u64("PLACES_DETAILS_TTL_SECS", DEFAULT_DETAILS_TTL_SECS)
                .min(MAX_TTL_SECS),
            identifier_cache_capacity: parse_usize(
                "PLACES_IDENTIFIER_CACHE_CAPACITY",
                DEFAULT_IDENTIFIER_CACHE_CAPACITY,
            )
            .max(1),
            details_cache_capacity: parse_usize(
                "PLACES_DETAILS_CACHE_CAPACITY",
                DEFAULT_DETAILS_CACHE_CAPACITY,
            )
            .max(1),
            details_store_path: env::var("PLACES_DETAILS_STORE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            photo_proxy_base: env::var("PLACES_PHOTO_PROXY_BASE")
                .unwrap_or_else(|_| "/api/places/photo".to_string()),
        }
    }

    /// Defaults without reading the environment; the credential is left empty.
    pub fn defaults() -> Self {
        Self {
            google_places_api_key: None,
            places_api_base: DEFAULT_PLACES_API_BASE.to_string(),
            places_language_code: "en".to_string(),
            places_region_code: Some("jp".to_string()),
            places_country_hint: Some("Japan".to_string()),
            request_timeout_ms: 10_000,
            identifier_ttl_secs: DEFAULT_IDENTIFIER_TTL_SECS,
            details_ttl_secs: DEFAULT_DETAILS_TTL_SECS,
            identifier_cache_capacity: DEFAULT_IDENTIFIER_CACHE_CAPACITY,
            details_cache_capacity: DEFAULT_DETAILS_CACHE_CAPACITY,
            details_store_path: None,
            photo_proxy_base: "/api/places/photo".to_string(),
        }
    }

    pub fn require_places_api_key(&self) -> AppResult<SecretString> {
        self.google_places_api_key.clone().ok_or_else(|| {
            AppError::Config(
                "GOOGLE_PLACES_API_KEY is not set; place details cannot be fetched".into(),
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn identifier_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.identifier_ttl_secs)
    }

    pub fn details_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.details_ttl_secs)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            places_api_base: self.places_api_base.clone(),
            places_language_code: self.places_language_code.clone(),
            places_region_code: self.places_region_code.clone(),
            request_timeout_ms: self.request_timeout_ms,
            identifier_ttl_secs: self.identifier_ttl_secs,
            details_ttl_secs: self.details_ttl_secs,
            identifier_cache_capacity: self.identifier_cache_capacity,
            details_cache_capacity: self.details_cache_capacity,
            details_store_path: self
                .details_store_path
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
            photo_proxy_base: self.photo_proxy_base.clone(),
            has_google_places_key: self.google_places_api_key.is_some(),
        }
    }
}

fn ttl_from_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

// An explicitly empty value disables the default.
fn parse_optional(key: &str, default: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value.trim().to_string()),
        Err(_) => Some(default.to_string()),
    }
}
