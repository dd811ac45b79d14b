//! HttpBackend against an in-process mock of the raster API.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use geodash_core::{Backend, FetchError, HttpBackend};
use geodash_proto::protocol::{PixelParams, RangeParams};
use geodash_proto::{DateRange, LayerId, Polygon};
use serde_json::json;
use tokio::net::TcpListener;

/// Serves the mock API on an ephemeral port; returns its base URL.
async fn spawn_mock() -> String {
    let app = Router::new()
        .route(
            "/api/tiles_lst",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let url = format!(
                    "https://ee/lst/{}/{}/{}",
                    q.get("start_date").cloned().unwrap_or_default(),
                    q.get("end_date").cloned().unwrap_or_default(),
                    q.contains_key("aoi")
                );
                Json(json!({ "tile_url": url }))
            }),
        )
        .route(
            "/api/tiles_ndvi",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Earth Engine quota exceeded" })),
                )
            }),
        )
        .route("/api/tiles_evi", get(|| async { Json(json!({ "tile_url": "" })) }))
        .route("/api/tiles_bad", get(|| async { "<html>oops</html>" }))
        .route(
            "/api/tiles_plain",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down").into_response() }),
        )
        .route(
            "/api/legend_stats_lst",
            get(|| async { Json(json!({ "min": -3.5, "max": 41.0 })) }),
        )
        .route(
            "/api/timeseries_lst",
            get(|| async {
                Json(json!({ "points": [{ "month": "2025-01", "value": 12.0 }] }))
            }),
        )
        .route(
            "/api/pixel_value",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("lat").map(String::as_str) != Some("10.5") {
                    return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "bad lat" })))
                        .into_response();
                }
                Json(json!({ "lst_value": 22.5, "ndvi_value": null })).into_response()
            }),
        )
        .route(
            "/api/timeseries",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let value: f64 = q.get("lng").and_then(|v| v.parse().ok()).unwrap_or(0.0);
                Json(json!({ "lst": [{ "month": "2025-02", "value": value }] }))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}/api/", addr)
}

fn params(aoi: Option<&Polygon>) -> RangeParams {
    RangeParams::new(&DateRange::parse("2025-01", "2025-03").unwrap(), aoi)
}

fn id(s: &str) -> LayerId {
    LayerId::new(s).unwrap()
}

#[tokio::test]
async fn tile_url_passes_range_and_aoi() {
    let backend = HttpBackend::new(spawn_mock().await);
    assert!(!backend.base_url().ends_with('/'));

    let url = backend.tile_url(&id("lst"), &params(None)).await.unwrap();
    assert_eq!(url, "https://ee/lst/2025-01/2025-03/false");

    let square = Polygon::rectangle(0.0, 0.0, 1.0, 1.0).unwrap();
    let url = backend
        .tile_url(&id("lst"), &params(Some(&square)))
        .await
        .unwrap();
    assert!(url.ends_with("/true"));
}

#[tokio::test]
async fn backend_errors_carry_status_and_detail() {
    let backend = HttpBackend::new(spawn_mock().await);

    let err = backend.tile_url(&id("ndvi"), &params(None)).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::BackendError {
            status: Some(500),
            detail: "Earth Engine quota exceeded".into(),
        }
    );

    let err = backend.tile_url(&id("plain"), &params(None)).await.unwrap_err();
    assert_eq!(
        err,
        FetchError::BackendError {
            status: Some(502),
            detail: "upstream down".into(),
        }
    );
}

#[tokio::test]
async fn malformed_bodies_are_backend_errors() {
    let backend = HttpBackend::new(spawn_mock().await);

    let err = backend.tile_url(&id("evi"), &params(None)).await.unwrap_err();
    assert!(matches!(err, FetchError::BackendError { status: None, .. }));

    let err = backend.tile_url(&id("bad"), &params(None)).await.unwrap_err();
    assert!(matches!(err, FetchError::BackendError { status: None, .. }));
    assert!(!err.is_silent());
}

#[tokio::test]
async fn stats_and_series() {
    let backend = HttpBackend::new(spawn_mock().await);
    let stats = backend.legend_stats(&id("lst"), &params(None)).await.unwrap();
    assert_eq!((stats.min, stats.max), (-3.5, 41.0));

    let points = backend.layer_series(&id("lst"), &params(None)).await.unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].value, Some(12.0));
}

#[tokio::test]
async fn pixel_values_by_layer_key() {
    let backend = HttpBackend::new(spawn_mock().await);
    let body = backend
        .pixel_value(&PixelParams {
            lat: 10.5,
            lng: 20.0,
            start_date: "2025-01".into(),
            end_date: "2025-01".into(),
        })
        .await
        .unwrap();
    assert_eq!(body.value_for(&id("lst")), Some(22.5));
    assert_eq!(body.value_for(&id("ndvi")), None);
    assert_eq!(body.value_for(&id("evi")), None);

    let series = backend.point_series(10.5, 7.0).await.unwrap();
    assert_eq!(series.0["lst"][0].value, Some(7.0));
}

#[tokio::test]
async fn unreachable_backend_is_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(format!("http://{}/api", addr));
    let err = backend.tile_url(&id("lst"), &params(None)).await.unwrap_err();
    assert!(matches!(err, FetchError::NetworkFailure(_)));
}
