use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::provider::{PhotoSizeHints, PhotoStream, PlacesProvider};

const MAX_PHOTO_PX: u32 = 4800;
const DEFAULT_PHOTO_WIDTH_PX: u32 = 800;

/// Client-facing URL for a provider photo reference. The reference travels as
/// an opaque token so the provider path and credentials stay server-side.
pub fn proxy_url(proxy_base: &str, reference: &str) -> String {
    format!(
        "{}/{}",
        proxy_base.trim_end_matches('/'),
        encode_photo_token(reference)
    )
}

pub fn encode_photo_token(reference: &str) -> String {
    URL_SAFE_NO_PAD.encode(reference.as_bytes())
}

pub fn decode_photo_token(token: &str) -> AppResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| AppError::InvalidPhotoReference(token.to_string()))?;
    let reference =
        String::from_utf8(bytes).map_err(|_| AppError::InvalidPhotoReference(token.to_string()))?;
    validate_reference(&reference)?;
    Ok(reference)
}

/// Accepts only `places/{place}/photos/{photo}` so the proxy cannot be pointed
/// at arbitrary provider paths.
fn validate_reference(reference: &str) -> AppResult<()> {
    let segments: Vec<&str> = reference.split('/').collect();
    let well_formed = segments.len() == 4
        && segments[0] == "places"
        && segments[2] == "photos"
        && [segments[1], segments[3]].iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        });
    if well_formed {
        Ok(())
    } else {
        Err(AppError::InvalidPhotoReference(reference.to_string()))
    }
}

fn sanitize_hints(hints: PhotoSizeHints) -> PhotoSizeHints {
    let clamp = |value: Option<u32>| value.map(|px| px.clamp(1, MAX_PHOTO_PX));
    let sanitized = PhotoSizeHints {
        max_width: clamp(hints.max_width),
        max_height: clamp(hints.max_height),
    };
    if sanitized.max_width.is_none() && sanitized.max_height.is_none() {
        PhotoSizeHints {
            max_width: Some(DEFAULT_PHOTO_WIDTH_PX),
            max_height: None,
        }
    } else {
        sanitized
    }
}

#[derive(Clone)]
pub struct PhotoProxy {
    provider: Arc<dyn PlacesProvider>,
    proxy_base: String,
}

impl PhotoProxy {
    pub fn new(provider: Arc<dyn PlacesProvider>, proxy_base: impl Into<String>) -> Self {
        Self {
            provider,
            proxy_base: proxy_base.into(),
        }
    }

    pub fn proxy_base(&self) -> &str {
        &self.proxy_base
    }

    pub fn proxy_url(&self, reference: &str) -> String {
        proxy_url(&self.proxy_base, reference)
    }

    pub async fn stream_photo(
        &self,
        reference: &str,
        hints: PhotoSizeHints,
    ) -> AppResult<PhotoStream> {
        validate_reference(reference)?;
        let hints = sanitize_hints(hints);
        debug!(reference, ?hints, "proxying photo media");
        self.provider.photo_media(reference, hints).await
    }

    pub async fn stream_photo_token(
        &self,
        token: &str,
        hints: PhotoSizeHints,
    ) -> AppResult<PhotoStream> {
        let reference = decode_photo_token(token)?;
        self.stream_photo(&reference, hints).await
    }
}
