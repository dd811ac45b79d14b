//! Area-of-interest drawing state and the Apply gate.
//!
//! `committed` is true while the drawn geometry is the one the active query
//! was built from; Apply is only meaningful when it is false.

use geodash_proto::Polygon;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AoiState {
    drawing_enabled: bool,
    geometry: Option<Polygon>,
    committed: bool,
}

impl AoiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drawing_enabled(&self) -> bool {
        self.drawing_enabled
    }

    pub fn geometry(&self) -> Option<&Polygon> {
        self.geometry.as_ref()
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Enter or leave drawing mode.  Entering keeps the current geometry
    /// until a new shape is completed; leaving is a cancel.
    pub fn toggle_drawing(&mut self) {
        if self.drawing_enabled {
            self.cancel_drawing();
        } else {
            self.drawing_enabled = true;
            self.committed = false;
        }
    }

    /// Leave drawing mode, discarding the drawn geometry.
    pub fn cancel_drawing(&mut self) {
        self.drawing_enabled = false;
        self.geometry = None;
        self.committed = false;
    }

    pub fn on_geometry_drawn(&mut self, polygon: Polygon) {
        self.geometry = Some(polygon);
        self.committed = false;
    }

    /// Geometry to apply, or `None` when Apply would be a no-op.
    pub fn pending_apply(&self) -> Option<&Polygon> {
        match (&self.geometry, self.committed) {
            (Some(geometry), false) => Some(geometry),
            _ => {
                debug!(
                    "aoi: apply ignored (geometry={}, committed={})",
                    self.geometry.is_some(),
                    self.committed
                );
                None
            }
        }
    }

    /// The pending geometry is now part of the active query.
    pub fn mark_applied(&mut self) {
        if self.geometry.is_some() {
            self.committed = true;
            self.drawing_enabled = false;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
