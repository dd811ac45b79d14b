//! ViewState: the merged, render-facing result of all coordinators.
//!
//! Only the QueryCore loop writes it.  Each coordinator owns disjoint keys:
//! the tile coordinator owns `tiles`, the stats coordinator `stats`, the
//! pixel coordinator `pixel`.  Faults are keyed by (kind, layer).

use std::collections::BTreeMap;
use std::sync::Arc;

use geodash_proto::protocol::TimePoint;
use geodash_proto::{DateRange, LayerId, Polygon};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::context::QueryContext;
use crate::layers::LayerInfo;

pub type SharedView = Arc<RwLock<ViewState>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileEntry {
    pub url: String,
    /// Range the tile was rendered for.
    pub range: DateRange,
    pub clipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsEntry {
    pub min: f64,
    pub max: f64,
    pub range: DateRange,
    /// Trailing window ending at `range.end()`; empty when not requested.
    pub series: Vec<TimePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    Tiles,
    Stats,
}

/// Non-blocking failure indicator for one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    pub kind: FetchKind,
    pub layer: LayerId,
    pub message: String,
}

/// One map click.  `sequence` is the only staleness discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelQuery {
    pub lat: f64,
    pub lng: f64,
    pub range: DateRange,
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PixelValues {
    pub values: BTreeMap<LayerId, Option<f64>>,
    /// Point series per layer; empty unless requested.
    pub series: BTreeMap<LayerId, Vec<TimePoint>>,
}

/// Pixel slot state machine:
/// `Idle -> Pending -> {Resolved | Cancelled | Errored}`; a click always
/// re-enters `Pending`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PixelSlot {
    #[default]
    Idle,
    Pending { query: PixelQuery },
    Resolved { query: PixelQuery, values: PixelValues },
    Errored { query: PixelQuery, message: String },
    Cancelled { query: PixelQuery },
}

impl PixelSlot {
    pub fn query(&self) -> Option<&PixelQuery> {
        match self {
            Self::Idle => None,
            Self::Pending { query }
            | Self::Resolved { query, .. }
            | Self::Errored { query, .. }
            | Self::Cancelled { query } => Some(query),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AoiView {
    pub drawing_enabled: bool,
    pub geometry: Option<Polygon>,
    pub committed: bool,
    /// Geometry the active context was built with.
    pub applied: Option<Polygon>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    /// Incremented on every published change.
    pub rev: u64,
    pub context: Option<QueryContext>,
    pub layers: Vec<LayerInfo>,
    pub tiles: BTreeMap<LayerId, TileEntry>,
    pub stats: BTreeMap<LayerId, StatsEntry>,
    pub faults: Vec<Fault>,
    pub pixel: PixelSlot,
    pub aoi: AoiView,
}

impl ViewState {
    pub fn tile_url(&self, layer: &LayerId) -> Option<&str> {
        self.tiles.get(layer).map(|t| t.url.as_str())
    }

    pub fn fault(&self, kind: FetchKind, layer: &LayerId) -> Option<&Fault> {
        self.faults
            .iter()
            .find(|f| f.kind == kind && &f.layer == layer)
    }

    /// Record a failure, replacing any earlier one for the same slot.
    /// Returns `true` if the indicator is new or its message changed.
    pub fn set_fault(&mut self, kind: FetchKind, layer: &LayerId, message: String) -> bool {
        if let Some(existing) = self
            .faults
            .iter_mut()
            .find(|f| f.kind == kind && &f.layer == layer)
        {
            let changed = existing.message != message;
            existing.message = message;
            return changed;
        }
        self.faults.push(Fault {
            kind,
            layer: layer.clone(),
            message,
        });
        true
    }

    pub fn clear_fault(&mut self, kind: FetchKind, layer: &LayerId) -> bool {
        let before = self.faults.len();
        self.faults
            .retain(|f| !(f.kind == kind && &f.layer == layer));
        before != self.faults.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lst() -> LayerId {
        LayerId::new("lst").unwrap()
    }

    #[test]
    fn test_fault_replaced_not_duplicated() {
        let mut view = ViewState::default();
        assert!(view.set_fault(FetchKind::Tiles, &lst(), "500".into()));
        assert!(view.set_fault(FetchKind::Tiles, &lst(), "timeout".into()));
        assert!(!view.set_fault(FetchKind::Tiles, &lst(), "timeout".into()));
        assert!(view.set_fault(FetchKind::Stats, &lst(), "500".into()));
        assert_eq!(view.faults.len(), 2);
        assert_eq!(view.fault(FetchKind::Tiles, &lst()).unwrap().message, "timeout");

        assert!(view.clear_fault(FetchKind::Tiles, &lst()));
        assert!(!view.clear_fault(FetchKind::Tiles, &lst()));
        assert_eq!(view.faults.len(), 1);
    }

    #[test]
    fn test_pixel_slot_serializes_tagged() {
        let slot = PixelSlot::Pending {
            query: PixelQuery {
                lat: 10.0,
                lng: 20.0,
                range: DateRange::parse("2025-01", "2025-01").unwrap(),
                sequence: 1,
            },
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["query"]["sequence"], 1);
        assert_eq!(slot.query().map(|q| q.lat), Some(10.0));
    }
}
