use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::CategoryMatch;

pub const MAX_REVIEWS: usize = 5;
pub const MAX_PHOTOS: usize = 8;

/// A location record owned by the content system. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl Location {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        city: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            city: city.into(),
            region: region.into(),
            external_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// The curated provider identifier, ignoring blank values.
    pub fn trusted_external_id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Which attributes a details call asks the provider for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMask {
    /// Interactive and display paths.
    #[default]
    Display,
    /// Batch enrichment: everything the canonical shape can hold.
    Full,
}

impl FieldMask {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMask::Display => "display",
            FieldMask::Full => "full",
        }
    }

    pub fn header_value(&self) -> &'static str {
        match self {
            FieldMask::Display => {
                "id,formattedAddress,shortFormattedAddress,rating,userRatingCount,\
                 websiteUri,nationalPhoneNumber,googleMapsUri,regularOpeningHours,\
                 currentOpeningHours,photos"
            }
            FieldMask::Full => {
                "id,displayName,formattedAddress,shortFormattedAddress,addressComponents,\
                 location,rating,userRatingCount,editorialSummary,websiteUri,\
                 nationalPhoneNumber,internationalPhoneNumber,googleMapsUri,\
                 regularOpeningHours,currentOpeningHours,reviews,photos,primaryType,types"
            }
        }
    }

    pub fn covers(&self, requested: FieldMask) -> bool {
        matches!(
            (self, requested),
            (FieldMask::Full, _) | (FieldMask::Display, FieldMask::Display)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Result of resolving a location to a provider identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentifier {
    pub external_id: String,
    pub matched_name: Option<String>,
    pub formatted_address: Option<String>,
}

impl ResolvedIdentifier {
    pub fn trusted(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            matched_name: None,
            formatted_address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDetails {
    pub external_id: String,
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub short_address: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub editorial_summary: Option<String>,
    #[serde(default)]
    pub website_uri: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub maps_uri: Option<String>,
    #[serde(default)]
    pub open_now: Option<bool>,
    #[serde(default)]
    pub regular_hours: Vec<OpeningPeriod>,
    #[serde(default)]
    pub current_hours: Vec<OpeningPeriod>,
    #[serde(default)]
    pub weekday_descriptions: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub category: Option<CategoryMatch>,
    #[serde(default)]
    pub field_mask: FieldMask,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub author_name: String,
    #[serde(default)]
    pub author_uri: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub relative_time: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub reference: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub proxy_url: String,
    #[serde(default)]
    pub attributions: Vec<PhotoAttribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAttribution {
    pub display_name: String,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTime {
    /// 0 = Sunday.
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningPeriod {
    pub open: DayTime,
    /// Absent for places open around the clock.
    #[serde(default)]
    pub close: Option<DayTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteBias {
    pub center: Option<Coordinates>,
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub region_codes: Vec<String>,
    pub language_code: Option<String>,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteCandidate {
    pub external_id: String,
    pub text: String,
    pub main_text: Option<String>,
    pub secondary_text: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// An ad-hoc lookup result for a place with no internal record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPlace {
    pub location: Location,
    pub details: LocationDetails,
}
