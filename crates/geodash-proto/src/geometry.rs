//! GeoJSON polygon used as the area of interest.
//!
//! Positions are `[lng, lat]` as in GeoJSON. Every ring is stored closed
//! (first position repeated at the end).

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPolygon", into = "GeoJsonPolygon")]
pub struct Polygon {
    rings: Vec<Vec<[f64; 2]>>,
}

/// Wire shape: `{"type": "Polygon", "coordinates": [[[lng, lat], ...]]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonPolygon {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    /// Build a polygon from an exterior ring, closing it if needed.
    pub fn new(exterior: Vec<[f64; 2]>) -> Result<Self, ProtoError> {
        Self::with_holes(exterior, Vec::new())
    }

    pub fn with_holes(
        exterior: Vec<[f64; 2]>,
        holes: Vec<Vec<[f64; 2]>>,
    ) -> Result<Self, ProtoError> {
        let mut rings = Vec::with_capacity(1 + holes.len());
        rings.push(close_ring(exterior)?);
        for hole in holes {
            rings.push(close_ring(hole)?);
        }
        Ok(Self { rings })
    }

    /// Axis-aligned rectangle (the rectangle draw tool).
    pub fn rectangle(south: f64, west: f64, north: f64, east: f64) -> Result<Self, ProtoError> {
        if south >= north || west >= east {
            return Err(ProtoError::InvalidPolygon(format!(
                "degenerate rectangle s={south} w={west} n={north} e={east}"
            )));
        }
        Self::new(vec![
            [west, south],
            [east, south],
            [east, north],
            [west, north],
        ])
    }

    pub fn exterior(&self) -> &[[f64; 2]] {
        &self.rings[0]
    }

    pub fn rings(&self) -> &[Vec<[f64; 2]>] {
        &self.rings
    }

    /// Compact GeoJSON, as sent in the `aoi` query parameter.
    pub fn to_geojson(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_geojson(s: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(s).map_err(|e| ProtoError::InvalidPolygon(e.to_string()))
    }
}

fn close_ring(mut ring: Vec<[f64; 2]>) -> Result<Vec<[f64; 2]>, ProtoError> {
    if ring.iter().flatten().any(|c| !c.is_finite()) {
        return Err(ProtoError::InvalidPolygon("non-finite coordinate".into()));
    }
    let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) else {
        return Err(ProtoError::InvalidPolygon("empty ring".into()));
    };
    if first != last {
        ring.push(first);
    }
    let mut distinct: Vec<[f64; 2]> = Vec::new();
    for p in &ring {
        if !distinct.contains(p) {
            distinct.push(*p);
        }
    }
    if distinct.len() < 3 {
        return Err(ProtoError::InvalidPolygon(format!(
            "ring needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }
    Ok(ring)
}

impl TryFrom<GeoJsonPolygon> for Polygon {
    type Error = ProtoError;

    fn try_from(value: GeoJsonPolygon) -> Result<Self, Self::Error> {
        if value.kind != "Polygon" {
            return Err(ProtoError::InvalidPolygon(format!(
                "expected type Polygon, got {}",
                value.kind
            )));
        }
        let mut rings = value.coordinates.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| ProtoError::InvalidPolygon("no rings".into()))?;
        Self::with_holes(exterior, rings.collect())
    }
}

impl From<Polygon> for GeoJsonPolygon {
    fn from(value: Polygon) -> Self {
        Self {
            kind: "Polygon".to_string(),
            coordinates: value.rings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closes_open_ring() {
        let p = Polygon::new(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]).unwrap();
        assert_eq!(p.exterior().len(), 4);
        assert_eq!(p.exterior().first(), p.exterior().last());
    }

    #[test]
    fn test_rejects_degenerate() {
        assert!(Polygon::new(vec![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).is_err());
        assert!(Polygon::new(vec![]).is_err());
        assert!(Polygon::new(vec![[0.0, 0.0], [f64::NAN, 1.0], [2.0, 2.0]]).is_err());
        assert!(Polygon::rectangle(10.0, 0.0, 5.0, 1.0).is_err());
    }

    #[test]
    fn test_geojson_shape() {
        let p = Polygon::rectangle(0.0, 0.0, 1.0, 2.0).unwrap();
        let json: serde_json::Value = serde_json::from_str(&p.to_geojson()).unwrap();
        assert_eq!(json["type"], "Polygon");
        assert_eq!(json["coordinates"][0].as_array().unwrap().len(), 5);
        assert_eq!(json["coordinates"][0][1][0], 2.0);

        let back = Polygon::from_geojson(&p.to_geojson()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_rejects_other_geometry_types() {
        let err = Polygon::from_geojson(r#"{"type":"Point","coordinates":[[[0,0]]]}"#);
        assert!(err.is_err());
    }
}
