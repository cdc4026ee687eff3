//! Pure mapping from provider payloads to the canonical place shape.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::categories::map_place_type;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Coordinates, DayTime, FieldMask, Location, LocationDetails, OpeningPeriod, Photo,
    PhotoAttribution, Review, MAX_PHOTOS, MAX_REVIEWS,
};
use crate::photos::proxy_url;
use crate::provider::{RawOpeningHours, RawPhoto, RawPlace, RawPoint, RawReview};
use crate::store::DurableRow;

const ANONYMOUS_AUTHOR: &str = "Anonymous";

pub struct TransformContext<'a> {
    pub fetched_at: DateTime<Utc>,
    pub field_mask: FieldMask,
    pub proxy_base: &'a str,
}

pub fn transform_details(
    external_id: &str,
    raw: RawPlace,
    ctx: &TransformContext<'_>,
) -> LocationDetails {
    let category = if raw.primary_type.is_some() || !raw.types.is_empty() {
        Some(map_place_type(raw.primary_type.as_deref(), &raw.types))
    } else {
        None
    };
    let open_now = raw
        .current_opening_hours
        .as_ref()
        .and_then(|hours| hours.open_now)
        .or_else(|| raw.regular_opening_hours.as_ref().and_then(|h| h.open_now));
    let weekday_descriptions = raw
        .regular_opening_hours
        .as_ref()
        .map(|hours| hours.weekday_descriptions.clone())
        .unwrap_or_default();

    LocationDetails {
        external_id: raw.id.unwrap_or_else(|| external_id.to_string()),
        formatted_address: raw.formatted_address.unwrap_or_default(),
        short_address: raw.short_formatted_address,
        rating: raw.rating,
        rating_count: raw.user_rating_count,
        editorial_summary: raw.editorial_summary.and_then(|summary| summary.text),
        website_uri: raw.website_uri,
        phone: raw.international_phone_number.or(raw.national_phone_number),
        maps_uri: raw.google_maps_uri,
        open_now,
        regular_hours: transform_hours(raw.regular_opening_hours.as_ref()),
        current_hours: transform_hours(raw.current_opening_hours.as_ref()),
        weekday_descriptions,
        reviews: transform_reviews(raw.reviews),
        photos: transform_photos(raw.photos, ctx.proxy_base),
        coordinates: raw.location.and_then(|loc| {
            Some(Coordinates {
                lat: loc.latitude?,
                lng: loc.longitude?,
            })
        }),
        category,
        field_mask: ctx.field_mask,
        fetched_at: ctx.fetched_at,
    }
}

/// Keeps provider order and truncates to [`MAX_REVIEWS`].
pub fn transform_reviews(raw: Vec<RawReview>) -> Vec<Review> {
    raw.into_iter()
        .take(MAX_REVIEWS)
        .map(|review| {
            let author = review.author_attribution.unwrap_or_default();
            Review {
                author_name: author
                    .display_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string()),
                author_uri: author.uri,
                rating: review.rating,
                text: review
                    .text
                    .and_then(|text| text.text)
                    .or_else(|| review.original_text.and_then(|text| text.text)),
                relative_time: review.relative_publish_time_description,
                published_at: review
                    .publish_time
                    .as_deref()
                    .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                    .map(|value| value.with_timezone(&Utc)),
            }
        })
        .collect()
}

/// Keeps provider order and truncates to [`MAX_PHOTOS`]. Photos without a
/// reference cannot be proxied and are skipped before truncation.
pub fn transform_photos(raw: Vec<RawPhoto>, proxy_base: &str) -> Vec<Photo> {
    raw.into_iter()
        .filter_map(|photo| {
            let reference = photo.name.filter(|name| !name.trim().is_empty())?;
            Some(Photo {
                proxy_url: proxy_url(proxy_base, &reference),
                reference,
                width: photo.width_px,
                height: photo.height_px,
                attributions: photo
                    .author_attributions
                    .into_iter()
                    .filter_map(|author| {
                        Some(PhotoAttribution {
                            display_name: author.display_name?,
                            uri: author.uri,
                        })
                    })
                    .collect(),
            })
        })
        .take(MAX_PHOTOS)
        .collect()
}

pub fn transform_hours(raw: Option<&RawOpeningHours>) -> Vec<OpeningPeriod> {
    let Some(hours) = raw else {
        return Vec::new();
    };
    hours
        .periods
        .iter()
        .filter_map(|period| {
            Some(OpeningPeriod {
                open: day_time(period.open?)?,
                close: period.close.and_then(day_time),
            })
        })
        .collect()
}

fn day_time(point: RawPoint) -> Option<DayTime> {
    Some(DayTime {
        day: point.day?,
        hour: point.hour.unwrap_or(0),
        minute: point.minute.unwrap_or(0),
    })
}

/// Brings a stored payload into canonical shape. Older rows may lack
/// `fetchedAt` or `externalId`; the row's columns fill them in, and the list
/// caps are re-applied.
pub fn normalize_durable_row(row: &DurableRow) -> AppResult<LocationDetails> {
    let mut payload = row.payload.clone();
    let object = payload.as_object_mut().ok_or_else(|| {
        AppError::InvalidRow(format!("payload for {} is not an object", row.location_id))
    })?;
    if object.get("fetchedAt").map_or(true, Value::is_null) {
        object.insert("fetchedAt".into(), Value::String(row.fetched_at.to_rfc3339()));
    }
    if object.get("externalId").map_or(true, Value::is_null) {
        object.insert("externalId".into(), Value::String(row.external_id.clone()));
    }

    let mut details: LocationDetails = serde_json::from_value(payload)?;
    details.reviews.truncate(MAX_REVIEWS);
    details.photos.truncate(MAX_PHOTOS);
    Ok(details)
}

/// Builds a synthetic internal record for a place known only by identifier.
pub fn location_from_raw(external_id: &str, raw: &RawPlace) -> Location {
    let component = |kind: &str| {
        raw.address_components
            .iter()
            .find(|component| component.types.iter().any(|t| t == kind))
            .and_then(|component| component.long_text.clone())
    };
    let name = raw
        .display_name
        .as_ref()
        .and_then(|name| name.text.clone())
        .unwrap_or_else(|| external_id.to_string());
    Location {
        id: format!("place:{external_id}"),
        name,
        city: component("locality")
            .or_else(|| component("administrative_area_level_2"))
            .unwrap_or_default(),
        region: component("administrative_area_level_1").unwrap_or_default(),
        external_id: Some(external_id.to_string()),
    }
}
