//! The immutable snapshot of what the user currently wants.
//!
//! Every tile/stats result carries the context it was requested for and is
//! published only while that context is still the active one.

use std::collections::BTreeSet;

use geodash_proto::{DateRange, LayerId, Month, Polygon};
use serde::Serialize;

use crate::layers::LayerSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    range: DateRange,
    aoi: Option<Polygon>,
    enabled_layers: BTreeSet<LayerId>,
}

/// Pure: structurally equal inputs give structurally equal contexts.
pub fn build_context(layers: &LayerSet, range: DateRange, aoi: Option<&Polygon>) -> QueryContext {
    QueryContext {
        range,
        aoi: aoi.cloned(),
        enabled_layers: layers.enabled_ids(),
    }
}

impl QueryContext {
    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn start_month(&self) -> Month {
        self.range.start()
    }

    pub fn end_month(&self) -> Month {
        self.range.end()
    }

    pub fn aoi(&self) -> Option<&Polygon> {
        self.aoi.as_ref()
    }

    pub fn enabled_layers(&self) -> &BTreeSet<LayerId> {
        &self.enabled_layers
    }

    pub fn is_enabled(&self, layer: &LayerId) -> bool {
        self.enabled_layers.contains(layer)
    }
}
