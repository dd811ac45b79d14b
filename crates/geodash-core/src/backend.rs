//! Backend client.
//!
//! `Backend` is the seam between the coordinators and the network; the
//! coordinators only ever see `Result<_, FetchError>`.

use async_trait::async_trait;
use geodash_proto::protocol::{
    ErrorBody, LegendStatsResponse, PixelParams, PixelResponse, PointSeriesResponse,
    RangeParams, SeriesResponse, TileResponse, TimePoint,
};
use geodash_proto::LayerId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::FetchError;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Renderable tile URL template for one layer.
    async fn tile_url(&self, layer: &LayerId, params: &RangeParams) -> Result<String, FetchError>;

    async fn legend_stats(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<LegendStatsResponse, FetchError>;

    /// Monthly series over `params`' range for one layer.
    async fn layer_series(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<Vec<TimePoint>, FetchError>;

    async fn pixel_value(&self, params: &PixelParams) -> Result<PixelResponse, FetchError>;

    /// Trailing series for every layer at one point.
    async fn point_series(&self, lat: f64, lng: f64) -> Result<PointSeriesResponse, FetchError>;
}

/// reqwest-backed implementation.  No request timeout is set: a hung
/// request keeps its layer on the last good value.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .map(|e| match e.detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).trim().to_string());
            return Err(FetchError::BackendError {
                status: Some(status.as_u16()),
                detail,
            });
        }

        serde_json::from_slice(&body)
            .map_err(|e| FetchError::malformed(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn tile_url(&self, layer: &LayerId, params: &RangeParams) -> Result<String, FetchError> {
        let body: TileResponse = self.get_json(&format!("tiles_{}", layer), params).await?;
        if body.tile_url.trim().is_empty() {
            return Err(FetchError::malformed(format!("tiles_{}: empty tile_url", layer)));
        }
        Ok(body.tile_url)
    }

    async fn legend_stats(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<LegendStatsResponse, FetchError> {
        let body: LegendStatsResponse = self
            .get_json(&format!("legend_stats_{}", layer), params)
            .await?;
        if !body.min.is_finite() || !body.max.is_finite() {
            return Err(FetchError::malformed(format!(
                "legend_stats_{}: non-finite bounds",
                layer
            )));
        }
        Ok(body)
    }

    async fn layer_series(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<Vec<TimePoint>, FetchError> {
        let body: SeriesResponse = self
            .get_json(&format!("timeseries_{}", layer), params)
            .await?;
        Ok(body.points)
    }

    async fn pixel_value(&self, params: &PixelParams) -> Result<PixelResponse, FetchError> {
        self.get_json("pixel_value", params).await
    }

    async fn point_series(&self, lat: f64, lng: f64) -> Result<PointSeriesResponse, FetchError> {
        self.get_json("timeseries", &[("lat", lat), ("lng", lng)]).await
    }
}
