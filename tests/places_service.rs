use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::{all_of, contains, eq, json_decoded, key, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::{json, Value};
use tempfile::tempdir;

use trip_places::{
    AppConfig, AppError, AutocompleteBias, AutocompleteCandidate, Coordinates, DurableStore,
    DurableTier, HttpPlacesClient, Location, PhotoSizeHints, PlacesService, SqliteDetailsStore,
    SystemClock, MAX_PHOTOS, MAX_REVIEWS,
};

fn config_for(server: &Server) -> AppConfig {
    let mut config = AppConfig::defaults();
    config.google_places_api_key = Some(SecretString::from("test-key".to_string()));
    config.places_api_base = server.url("/").to_string();
    config.request_timeout_ms = 2_000;
    config
}

fn details_body(photos: usize, reviews: usize) -> Value {
    let photos: Vec<Value> = (0..photos)
        .map(|i| json!({ "name": format!("places/X123/photos/p{i}"), "widthPx": 1600, "heightPx": 1200 }))
        .collect();
    let reviews: Vec<Value> = (0..reviews)
        .map(|i| json!({
            "authorAttribution": { "displayName": format!("Reviewer {i}") },
            "rating": 5,
            "text": { "text": "Stunning in the snow." }
        }))
        .collect();
    json!({
        "id": "X123",
        "displayName": { "text": "Kinkaku-ji" },
        "formattedAddress": "1 Kinkakuji-cho, Kyoto",
        "addressComponents": [
            { "longText": "Kyoto", "types": ["locality", "political"] },
            { "longText": "Kyoto Prefecture", "types": ["administrative_area_level_1"] }
        ],
        "location": { "latitude": 35.0394, "longitude": 135.7292 },
        "rating": 4.6,
        "userRatingCount": 61000,
        "primaryType": "buddhist_temple",
        "types": ["buddhist_temple", "tourist_attraction", "point_of_interest"],
        "photos": photos,
        "reviews": reviews
    })
}

fn kinkakuji() -> Location {
    Location::new("loc-kinkakuji", "Kinkaku-ji", "Kyoto", "Kyoto")
}

#[tokio::test]
async fn resolves_fetches_and_proxies_photos() {
    let server = Server::run();

    server.expect(
        Expectation::matching(all_of![
            request::method("POST"),
            request::path("/places:searchText"),
            request::headers(contains(key("x-goog-api-key"))),
            request::body(json_decoded(eq(json!({
                "textQuery": "Kinkaku-ji, Kyoto, Japan",
                "pageSize": 1,
                "languageCode": "en",
                "regionCode": "jp"
            })))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "places": [{
                "id": "X123",
                "displayName": { "text": "Kinkaku-ji" },
                "formattedAddress": "1 Kinkakuji-cho, Kyoto"
            }]
        }))),
    );

    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/places/X123"),
            request::headers(contains(key("x-goog-fieldmask"))),
        ])
        .times(1)
        .respond_with(json_encoded(details_body(10, 6))),
    );

    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/places/X123/photos/p0/media"),
            request::query(url_decoded(contains(("maxWidthPx", "800")))),
        ])
        .times(1)
        .respond_with(
            status_code(200)
                .append_header("Content-Type", "image/jpeg")
                .append_header("Cache-Control", "public, max-age=86400")
                .body("jpeg-bytes"),
        ),
    );

    let service = PlacesService::from_config(&config_for(&server)).unwrap();

    let details = service.get_full_details(&kinkakuji()).await.unwrap();
    assert_eq!(details.external_id, "X123");
    assert_eq!(details.photos.len(), MAX_PHOTOS);
    assert_eq!(details.reviews.len(), MAX_REVIEWS);
    assert_eq!(details.formatted_address, "1 Kinkakuji-cho, Kyoto");

    let cached = service.get_details(&kinkakuji()).await.unwrap();
    assert_eq!(cached, details);

    let token = details.photos[0]
        .proxy_url
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    let photo = service
        .stream_photo_token(&token, PhotoSizeHints::default())
        .await
        .unwrap();
    assert_eq!(photo.content_type(), Some("image/jpeg"));
    assert_eq!(photo.header("cache-control"), Some("public, max-age=86400"));
    assert_eq!(photo.collect_bytes().await.unwrap(), b"jpeg-bytes".to_vec());
}

#[tokio::test]
async fn upstream_failures_surface_and_are_not_cached() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/places/X123"),
        ])
        .times(2)
        .respond_with(status_code(503)),
    );

    let service = PlacesService::from_config(&config_for(&server)).unwrap();
    let location = kinkakuji().with_external_id("X123");

    let err = service.get_details(&location).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, AppError::Upstream { status: 503, .. }));
    assert!(service.get_details_lossy(&location).await.is_none());
}

#[tokio::test]
async fn unknown_identifier_yields_none() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/places/GONE"),
        ])
        .times(2)
        .respond_with(status_code(404)),
    );

    let service = PlacesService::from_config(&config_for(&server)).unwrap();
    assert!(service
        .fetch_full_details_by_identifier("GONE")
        .await
        .unwrap()
        .is_none());
    assert!(service
        .fetch_coordinates_by_identifier("GONE")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn durable_tier_is_shared_across_service_instances() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method("GET"),
            request::path("/places/X123"),
        ])
        .times(1)
        .respond_with(json_encoded(details_body(2, 1))),
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("details.db");
    let config = config_for(&server);
    let location = kinkakuji().with_external_id("X123");
    let client = Arc::new(HttpPlacesClient::from_config(&config).unwrap());

    let store = Arc::new(SqliteDetailsStore::open(&path).unwrap());
    let first = PlacesService::with_provider(
        client.clone(),
        &config,
        DurableTier::ready(store.clone()),
        Arc::new(SystemClock),
    );
    let fetched = first.get_details(&location).await.unwrap();

    let mut persisted = false;
    for _ in 0..200 {
        if store.load(&location.id).unwrap().is_some() {
            persisted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(persisted);

    let mut second_config = config.clone();
    second_config.details_store_path = Some(path);
    let second = PlacesService::with_provider(
        client,
        &second_config,
        DurableTier::from_config(&second_config),
        Arc::new(SystemClock),
    );
    let reloaded = second.get_details(&location).await.unwrap();
    assert_eq!(reloaded, fetched);
    assert!(second.health().durable_store_available);
}

#[tokio::test]
async fn autocomplete_sends_bias_and_maps_predictions() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method("POST"),
            request::path("/places:autocomplete"),
            request::headers(contains(key("x-goog-api-key"))),
            request::body(json_decoded(eq(json!({
                "input": "kinkaku",
                "locationBias": {
                    "circle": {
                        "center": { "latitude": 35.0116, "longitude": 135.7681 },
                        "radius": 2000.0
                    }
                },
                "includedRegionCodes": ["jp"],
                "languageCode": "en",
                "sessionToken": "session-42"
            })))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "suggestions": [
                {
                    "placePrediction": {
                        "placeId": "X123",
                        "text": { "text": "Kinkaku-ji, Kyoto, Japan" },
                        "structuredFormat": {
                            "mainText": { "text": "Kinkaku-ji" },
                            "secondaryText": { "text": "Kyoto, Japan" }
                        },
                        "types": ["buddhist_temple", "tourist_attraction"]
                    }
                },
                { "queryPrediction": { "text": { "text": "kinkaku temple" } } },
                {
                    "placePrediction": {
                        "placeId": "Y456",
                        "structuredFormat": { "mainText": { "text": "Kinkaku Ramen" } }
                    }
                }
            ]
        }))),
    );

    let service = PlacesService::from_config(&config_for(&server)).unwrap();
    let bias = AutocompleteBias {
        center: Some(Coordinates {
            lat: 35.0116,
            lng: 135.7681,
        }),
        radius_meters: Some(2000.0),
        session_token: Some("session-42".into()),
        ..AutocompleteBias::default()
    };

    let candidates = service.resolve_autocomplete("  kinkaku ", bias).await.unwrap();
    assert_eq!(
        candidates,
        vec![
            AutocompleteCandidate {
                external_id: "X123".into(),
                text: "Kinkaku-ji, Kyoto, Japan".into(),
                main_text: Some("Kinkaku-ji".into()),
                secondary_text: Some("Kyoto, Japan".into()),
                types: vec!["buddhist_temple".into(), "tourist_attraction".into()],
            },
            AutocompleteCandidate {
                external_id: "Y456".into(),
                text: "Kinkaku Ramen".into(),
                main_text: Some("Kinkaku Ramen".into()),
                secondary_text: None,
                types: Vec::new(),
            },
        ]
    );
}

#[test]
fn missing_credential_is_a_configuration_error() {
    let err = PlacesService::from_config(&AppConfig::defaults())
        .err()
        .unwrap();
    assert!(matches!(err, AppError::Config(_)));
}
