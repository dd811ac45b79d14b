//! Local HTTP control surface.
//!
//! Exposes the merged view for a renderer and forwards control inputs
//! (layer toggles, date range, drawing surface, map clicks) into the core
//! loop as `CoreEvent::Action`s.  It never touches state directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use geodash_proto::{DateRange, LayerId, Polygon};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::core::{Action, CoreEvent};
use crate::view::{SharedView, ViewState};

#[derive(Clone)]
struct HttpState {
    view: SharedView,
    event_tx: mpsc::Sender<CoreEvent>,
}

#[derive(Deserialize)]
struct ClickParams {
    lat: f64,
    lng: f64,
}

pub fn router(view: SharedView, event_tx: mpsc::Sender<CoreEvent>) -> Router {
    let app_state = HttpState { view, event_tx };
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/layers/:id/toggle", post(toggle_layer))
        .route("/api/layers/:id/opacity/:value", post(set_opacity))
        .route("/api/range/:start/:end", post(set_range))
        .route("/api/click", post(click))
        .route("/api/pixel/dismiss", post(dismiss_pixel))
        .route("/api/aoi/draw", post(toggle_drawing))
        .route("/api/aoi/cancel", post(cancel_drawing))
        .route("/api/aoi/geometry", post(set_geometry))
        .route("/api/aoi/apply", post(apply_aoi))
        .route("/api/aoi/clear", post(clear_aoi))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    view: SharedView,
    event_tx: mpsc::Sender<CoreEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(view, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP control surface listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn forward(state: &HttpState, action: Action) -> StatusCode {
    if state
        .event_tx
        .send(CoreEvent::Action(action))
        .await
        .is_err()
    {
        error!("Failed to forward action: core loop is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<ViewState> {
    Json(state.view.read().await.clone())
}

async fn toggle_layer(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    match LayerId::new(id) {
        Ok(layer) => forward(&state, Action::ToggleLayer(layer)).await,
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn set_opacity(
    State(state): State<HttpState>,
    Path((id, value)): Path<(String, f32)>,
) -> StatusCode {
    match LayerId::new(id) {
        Ok(layer) => {
            forward(
                &state,
                Action::SetOpacity {
                    layer,
                    opacity: value,
                },
            )
            .await
        }
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn set_range(
    State(state): State<HttpState>,
    Path((start, end)): Path<(String, String)>,
) -> StatusCode {
    match DateRange::parse(&start, &end) {
        Ok(range) => {
            info!("HTTP: range {}", range);
            forward(&state, Action::SetRange(range)).await
        }
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

async fn click(State(state): State<HttpState>, Query(p): Query<ClickParams>) -> StatusCode {
    if !p.lat.is_finite() || !p.lng.is_finite() {
        return StatusCode::BAD_REQUEST;
    }
    forward(&state, Action::MapClick { lat: p.lat, lng: p.lng }).await
}

async fn dismiss_pixel(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Action::DismissPixel).await
}

async fn toggle_drawing(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Action::ToggleDrawing).await
}

async fn cancel_drawing(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Action::CancelDrawing).await
}

async fn set_geometry(State(state): State<HttpState>, Json(polygon): Json<Polygon>) -> StatusCode {
    forward(&state, Action::GeometryDrawn(polygon)).await
}

async fn apply_aoi(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Action::ApplyAoi).await
}

async fn clear_aoi(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Action::ClearAoi).await
}
