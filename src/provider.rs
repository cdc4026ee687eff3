use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{AutocompleteBias, AutocompleteCandidate};

const SEARCH_FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress";
const PHOTO_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "cache-control",
    "etag",
    "last-modified",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TextSearchRequest {
    pub query: String,
    pub language_code: String,
    pub region_code: Option<String>,
    pub page_size: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub external_id: String,
    pub display_name: Option<String>,
    pub formatted_address: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoSizeHints {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

/// Binary photo body plus the upstream content headers, passed through as-is.
pub struct PhotoStream {
    pub headers: Vec<(String, String)>,
    pub body: BoxStream<'static, AppResult<Vec<u8>>>,
}

impl PhotoStream {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub async fn collect_bytes(mut self) -> AppResult<Vec<u8>> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }
}

/// Outbound boundary to the place-data provider.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn text_search(&self, request: &TextSearchRequest) -> AppResult<Vec<SearchCandidate>>;

    /// `field_mask` is the raw provider mask header value.
    async fn place_details(&self, external_id: &str, field_mask: &str) -> AppResult<RawPlace>;

    async fn photo_media(&self, photo_name: &str, hints: PhotoSizeHints) -> AppResult<PhotoStream>;

    async fn autocomplete(
        &self,
        input: &str,
        bias: &AutocompleteBias,
    ) -> AppResult<Vec<AutocompleteCandidate>>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlace {
    pub id: Option<String>,
    pub display_name: Option<LocalizedText>,
    pub formatted_address: Option<String>,
    pub short_formatted_address: Option<String>,
    #[serde(default)]
    pub address_components: Vec<RawAddressComponent>,
    pub location: Option<RawLatLng>,
    pub rating: Option<f64>,
    pub user_rating_count: Option<u32>,
    pub editorial_summary: Option<LocalizedText>,
    pub website_uri: Option<String>,
    pub national_phone_number: Option<String>,
    pub international_phone_number: Option<String>,
    pub google_maps_uri: Option<String>,
    pub regular_opening_hours: Option<RawOpeningHours>,
    pub current_opening_hours: Option<RawOpeningHours>,
    #[serde(default)]
    pub reviews: Vec<RawReview>,
    #[serde(default)]
    pub photos: Vec<RawPhoto>,
    pub primary_type: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedText {
    pub text: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAddressComponent {
    pub long_text: Option<String>,
    pub short_text: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawLatLng {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOpeningHours {
    pub open_now: Option<bool>,
    #[serde(default)]
    pub periods: Vec<RawPeriod>,
    #[serde(default)]
    pub weekday_descriptions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPeriod {
    pub open: Option<RawPoint>,
    pub close: Option<RawPoint>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawPoint {
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    pub author_attribution: Option<RawAuthor>,
    pub rating: Option<f64>,
    pub text: Option<LocalizedText>,
    pub original_text: Option<LocalizedText>,
    pub relative_publish_time_description: Option<String>,
    pub publish_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAuthor {
    pub display_name: Option<String>,
    pub uri: Option<String>,
    pub photo_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPhoto {
    pub name: Option<String>,
    pub width_px: Option<u32>,
    pub height_px: Option<u32>,
    #[serde(default)]
    pub author_attributions: Vec<RawAuthor>,
}

pub struct HttpPlacesClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
}

impl HttpPlacesClient {
    pub fn new(api_key: SecretString, base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("trip-places/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config.require_places_api_key()?;
        Self::new(api_key, &config.places_api_base, config.request_timeout())
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        Url::parse(&format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .map_err(|err| AppError::Config(format!("invalid places API base URL: {err}")))
    }
}

fn check_status(response: Response, operation: &'static str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(operation, status = status.as_u16(), "places provider rejected request");
    Err(AppError::Upstream {
        operation,
        status: status.as_u16(),
    })
}

#[async_trait]
impl PlacesProvider for HttpPlacesClient {
    async fn text_search(&self, request: &TextSearchRequest) -> AppResult<Vec<SearchCandidate>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            text_query: &'a str,
            page_size: u8,
            language_code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            region_code: Option<&'a str>,
        }

        #[derive(Deserialize)]
        struct ResponseBody {
            #[serde(default)]
            places: Vec<RawPlace>,
        }

        let body = RequestBody {
            text_query: &request.query,
            page_size: request.page_size.max(1),
            language_code: &request.language_code,
            region_code: request.region_code.as_deref(),
        };

        info!(query = %request.query, "places text search");
        let response = self
            .http
            .post(self.endpoint("places:searchText")?)
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", SEARCH_FIELD_MASK)
            .json(&body)
            .send()
            .await?;
        let parsed: ResponseBody = check_status(response, "text_search")?.json().await?;

        Ok(parsed
            .places
            .into_iter()
            .filter_map(|place| {
                Some(SearchCandidate {
                    external_id: place.id?,
                    display_name: place.display_name.and_then(|name| name.text),
                    formatted_address: place.formatted_address,
                })
            })
            .collect())
    }

    async fn place_details(&self, external_id: &str, field_mask: &str) -> AppResult<RawPlace> {
        let mut url = self.endpoint("places")?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("invalid places API base URL".into()))?
            .push(external_id);

        info!(external_id, "places details call");
        let response = self
            .http
            .get(url)
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", field_mask)
            .send()
            .await?;
        Ok(check_status(response, "details")?.json().await?)
    }

    async fn photo_media(&self, photo_name: &str, hints: PhotoSizeHints) -> AppResult<PhotoStream> {
        let mut url = self.endpoint(&format!("{photo_name}/media"))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(width) = hints.max_width {
                query.append_pair("maxWidthPx", &width.to_string());
            }
            if let Some(height) = hints.max_height {
                query.append_pair("maxHeightPx", &height.to_string());
            }
        }

        let response = self
            .http
            .get(url)
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .send()
            .await?;
        let response = check_status(response, "photo_media")?;

        let headers = PHOTO_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .headers()
                    .get(*name)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(AppError::from))
            .boxed();

        Ok(PhotoStream { headers, body })
    }

    async fn autocomplete(
        &self,
        input: &str,
        bias: &AutocompleteBias,
    ) -> AppResult<Vec<AutocompleteCandidate>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            input: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            location_bias: Option<LocationBias>,
            #[serde(skip_serializing_if = "Option::is_none")]
            included_region_codes: Option<&'a [String]>,
            #[serde(skip_serializing_if = "Option::is_none")]
            language_code: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            session_token: Option<&'a str>,
        }

        #[derive(Serialize)]
        struct LocationBias {
            circle: BiasCircle,
        }

        #[derive(Serialize)]
        struct BiasCircle {
            center: BiasCenter,
            radius: f64,
        }

        #[derive(Serialize)]
        struct BiasCenter {
            latitude: f64,
            longitude: f64,
        }

        #[derive(Deserialize)]
        struct ResponseBody {
            #[serde(default)]
            suggestions: Vec<Suggestion>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Suggestion {
            place_prediction: Option<Prediction>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Prediction {
            place_id: Option<String>,
            text: Option<LocalizedText>,
            structured_format: Option<StructuredFormat>,
            #[serde(default)]
            types: Vec<String>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct StructuredFormat {
            main_text: Option<LocalizedText>,
            secondary_text: Option<LocalizedText>,
        }

        let body = RequestBody {
            input,
            location_bias: bias.center.map(|center| LocationBias {
                circle: BiasCircle {
                    center: BiasCenter {
                        latitude: center.lat,
                        longitude: center.lng,
                    },
                    radius: bias.radius_meters.unwrap_or(50_000.0),
                },
            }),
            included_region_codes: Some(bias.region_codes.as_slice())
                .filter(|codes| !codes.is_empty()),
            language_code: bias.language_code.as_deref(),
            session_token: bias.session_token.as_deref(),
        };

        let response = self
            .http
            .post(self.endpoint("places:autocomplete")?)
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let parsed: ResponseBody = check_status(response, "autocomplete")?.json().await?;

        Ok(parsed
            .suggestions
            .into_iter()
            .filter_map(|suggestion| {
                let prediction = suggestion.place_prediction?;
                let structured = prediction.structured_format;
                let main_text = structured
                    .as_ref()
                    .and_then(|format| format.main_text.as_ref())
                    .and_then(|text| text.text.clone());
                let secondary_text = structured
                    .as_ref()
                    .and_then(|format| format.secondary_text.as_ref())
                    .and_then(|text| text.text.clone());
                let text = prediction
                    .text
                    .and_then(|text| text.text)
                    .or_else(|| main_text.clone())?;
                Some(AutocompleteCandidate {
                    external_id: prediction.place_id?,
                    text,
                    main_text,
                    secondary_text,
                    types: prediction.types,
                })
            })
            .collect())
    }
}
