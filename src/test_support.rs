use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::cache::Clock;
use crate::errors::{AppError, AppResult};
use crate::models::{AutocompleteBias, AutocompleteCandidate};
use crate::provider::{
    PhotoSizeHints, PhotoStream, PlacesProvider, RawPlace, SearchCandidate, TextSearchRequest,
};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Scripted provider that records every outbound call.
#[derive(Default)]
pub struct FakeProvider {
    candidates: Mutex<VecDeque<Vec<SearchCandidate>>>,
    search_failures: Mutex<VecDeque<u16>>,
    search_requests: Mutex<Vec<TextSearchRequest>>,
    details: Mutex<HashMap<String, Value>>,
    details_failures: Mutex<VecDeque<u16>>,
    details_requests: Mutex<Vec<(String, String)>>,
    details_delay: Mutex<Option<Duration>>,
    autocomplete_results: Mutex<Vec<AutocompleteCandidate>>,
    autocomplete_calls: Mutex<usize>,
}

impl FakeProvider {
    pub fn push_candidate(&self, external_id: &str, name: &str, address: &str) {
        self.candidates.lock().push_back(vec![SearchCandidate {
            external_id: external_id.into(),
            display_name: Some(name.into()),
            formatted_address: Some(address.into()),
        }]);
    }

    pub fn fail_next_search(&self, status: u16) {
        self.search_failures.lock().push_back(status);
    }

    pub fn set_details(&self, external_id: &str, payload: Value) {
        self.details.lock().insert(external_id.into(), payload);
    }

    pub fn fail_next_details(&self, status: u16) {
        self.details_failures.lock().push_back(status);
    }

    pub fn delay_details(&self, delay: Duration) {
        *self.details_delay.lock() = Some(delay);
    }

    pub fn set_autocomplete(&self, results: Vec<AutocompleteCandidate>) {
        *self.autocomplete_results.lock() = results;
    }

    pub fn search_calls(&self) -> usize {
        self.search_requests.lock().len()
    }

    pub fn search_requests(&self) -> Vec<TextSearchRequest> {
        self.search_requests.lock().clone()
    }

    pub fn details_calls(&self) -> usize {
        self.details_requests.lock().len()
    }

    pub fn details_requests(&self) -> Vec<(String, String)> {
        self.details_requests.lock().clone()
    }

    pub fn autocomplete_calls(&self) -> usize {
        *self.autocomplete_calls.lock()
    }
}

#[async_trait]
impl PlacesProvider for FakeProvider {
    async fn text_search(&self, request: &TextSearchRequest) -> AppResult<Vec<SearchCandidate>> {
        self.search_requests.lock().push(request.clone());
        if let Some(status) = self.search_failures.lock().pop_front() {
            return Err(AppError::Upstream {
                operation: "text_search",
                status,
            });
        }
        Ok(self.candidates.lock().pop_front().unwrap_or_default())
    }

    async fn place_details(&self, external_id: &str, field_mask: &str) -> AppResult<RawPlace> {
        self.details_requests
            .lock()
            .push((external_id.to_string(), field_mask.to_string()));
        let delay = *self.details_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = self.details_failures.lock().pop_front() {
            return Err(AppError::Upstream {
                operation: "details",
                status,
            });
        }
        let payload = self.details.lock().get(external_id).cloned();
        match payload {
            Some(payload) => Ok(serde_json::from_value(payload)?),
            None => Err(AppError::Upstream {
                operation: "details",
                status: 404,
            }),
        }
    }

    async fn photo_media(&self, _: &str, _: PhotoSizeHints) -> AppResult<PhotoStream> {
        Ok(PhotoStream {
            headers: vec![("content-type".into(), "image/jpeg".into())],
            body: stream::iter(vec![Ok(vec![0xFF_u8, 0xD8])]).boxed(),
        })
    }

    async fn autocomplete(
        &self,
        _: &str,
        _: &AutocompleteBias,
    ) -> AppResult<Vec<AutocompleteCandidate>> {
        *self.autocomplete_calls.lock() += 1;
        Ok(self.autocomplete_results.lock().clone())
    }
}

/// Details payload with `photos` photos and `reviews` reviews, numbered in order.
pub fn details_payload(external_id: &str, photos: usize, reviews: usize) -> Value {
    let photos: Vec<Value> = (0..photos)
        .map(|i| json!({ "name": format!("places/{external_id}/photos/p{i}"), "widthPx": 1024, "heightPx": 768 }))
        .collect();
    let reviews: Vec<Value> = (0..reviews)
        .map(|i| json!({
            "authorAttribution": { "displayName": format!("Reviewer {i}") },
            "rating": 4,
            "text": { "text": format!("review {i}") }
        }))
        .collect();
    json!({
        "id": external_id,
        "displayName": { "text": "Kinkaku-ji" },
        "formattedAddress": "1 Kinkakuji-cho, Kyoto",
        "addressComponents": [
            { "longText": "Kyoto", "types": ["locality"] },
            { "longText": "Kyoto Prefecture", "types": ["administrative_area_level_1"] }
        ],
        "location": { "latitude": 35.0394, "longitude": 135.7292 },
        "rating": 4.6,
        "userRatingCount": 61000,
        "primaryType": "buddhist_temple",
        "types": ["buddhist_temple", "tourist_attraction"],
        "photos": photos,
        "reviews": reviews
    })
}
