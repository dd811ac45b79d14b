//! Backend wire format.
//!
//! Endpoints (all idempotent GETs, relative to the configured base URL):
//! ```text
//!  /tiles_{layer}?start_date&end_date[&aoi]        -> TileResponse
//!  /legend_stats_{layer}?start_date&end_date[&aoi] -> LegendStatsResponse
//!  /timeseries_{layer}?start_date&end_date[&aoi]   -> SeriesResponse
//!  /pixel_value?lat&lng&start_date&end_date        -> PixelResponse
//!  /timeseries?lat&lng                             -> PointSeriesResponse
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::month::{DateRange, Month};
use crate::geometry::Polygon;

/// Identifier of a raster layer (`lst`, `ndvi`, ...).
///
/// Ids are interpolated into endpoint paths, so only lowercase ASCII
/// letters, digits and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProtoError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(id))
        } else {
            Err(ProtoError::InvalidLayerId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LayerId {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LayerId {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LayerId> for String {
    fn from(value: LayerId) -> Self {
        value.0
    }
}

/// Query string shared by the per-layer range endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeParams {
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aoi: Option<String>,
}

impl RangeParams {
    pub fn new(range: &DateRange, aoi: Option<&Polygon>) -> Self {
        Self {
            start_date: range.start().to_string(),
            end_date: range.end().to_string(),
            aoi: aoi.map(Polygon::to_geojson),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelParams {
    pub lat: f64,
    pub lng: f64,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileResponse {
    pub tile_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegendStatsResponse {
    pub min: f64,
    pub max: f64,
}

/// One month of a time series. `value` is `None` when the backend had no
/// valid pixels for that month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub month: Month,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub points: Vec<TimePoint>,
}

/// `/pixel_value` body: one `<layer>_value` key per layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelResponse(pub BTreeMap<String, Option<f64>>);

impl PixelResponse {
    pub fn value_for(&self, layer: &LayerId) -> Option<f64> {
        self.0
            .get(&format!("{}_value", layer))
            .copied()
            .flatten()
    }
}

/// `/timeseries` body: one series per layer id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointSeriesResponse(pub BTreeMap<String, Vec<TimePoint>>);

/// FastAPI-style error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

/// Align `points` onto `window`: one entry per window month, in window
/// order, `None` where the backend returned nothing.
pub fn pad_series(window: &[Month], points: &[TimePoint]) -> Vec<TimePoint> {
    window
        .iter()
        .map(|month| TimePoint {
            month: *month,
            value: points
                .iter()
                .find(|p| p.month == *month)
                .and_then(|p| p.value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_id_validation() {
        assert!(LayerId::new("lst").is_ok());
        assert!(LayerId::new("ndvi_2").is_ok());
        assert!(LayerId::new("").is_err());
        assert!(LayerId::new("LST").is_err());
        assert!(LayerId::new("../x").is_err());
    }

    #[test]
    fn test_pixel_response_lookup() {
        let body: PixelResponse =
            serde_json::from_str(r#"{"lst_value": 21.5, "ndvi_value": null}"#).unwrap();
        assert_eq!(body.value_for(&LayerId::new("lst").unwrap()), Some(21.5));
        assert_eq!(body.value_for(&LayerId::new("ndvi").unwrap()), None);
        assert_eq!(body.value_for(&LayerId::new("evi").unwrap()), None);
    }

    #[test]
    fn test_range_params_omit_missing_aoi() {
        let range = DateRange::parse("2025-01", "2025-03").unwrap();
        let params = RangeParams::new(&range, None);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["start_date"], "2025-01");
        assert_eq!(json["end_date"], "2025-03");
        assert!(json.get("aoi").is_none());
    }

    #[test]
    fn test_pad_series_fills_gaps() {
        let end: Month = "2025-03".parse().unwrap();
        let window = end.trailing(3);
        let points = vec![TimePoint {
            month: "2025-02".parse().unwrap(),
            value: Some(1.0),
        }];
        let padded = pad_series(&window, &points);
        let values: Vec<Option<f64>> = padded.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![None, Some(1.0), None]);
    }
}
