//! Tile coordinator: one tile-URL request per enabled layer.
//!
//! Requests for different layers run concurrently and never wait on each
//! other.  A result is merged only while its context is still the active
//! one and its token still owns the layer's slot; anything else is dropped
//! without a trace beyond a debug line.

use std::sync::Arc;

use geodash_proto::protocol::RangeParams;
use geodash_proto::LayerId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::context::QueryContext;
use crate::core::CoreEvent;
use crate::error::FetchError;
use crate::token::{run_cancellable, SlotRegistry};
use crate::view::{FetchKind, TileEntry, ViewState};

/// Completion of one tile request, as delivered to the core loop.
#[derive(Debug, Clone)]
pub struct TileOutcome {
    pub layer: LayerId,
    pub generation: u64,
    pub context: Arc<QueryContext>,
    pub result: Result<String, FetchError>,
}

/// What happened to an arriving result.
#[derive(Debug, Clone, PartialEq)]
pub enum Merge {
    Published,
    /// Failure indicator set; previous value kept.  `fresh` is false when
    /// the same failure was already showing.
    Failed { message: String, fresh: bool },
    /// Superseded context or slot; dropped.
    Stale,
    /// Cancelled, aborted, or an optional part that failed; swallowed.
    Silent,
    /// Arrived ahead of the result it belongs to; kept until that lands.
    Held,
}

#[derive(Debug, Default)]
pub struct TileCoordinator {
    slots: SlotRegistry<LayerId>,
}

impl TileCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one request per enabled layer of `context`.  Slots of layers
    /// no longer enabled are aborted.  Returns the number of dispatches.
    pub fn refresh(
        &mut self,
        context: &Arc<QueryContext>,
        backend: &Arc<dyn Backend>,
        events: &mpsc::Sender<CoreEvent>,
    ) -> usize {
        self.slots.abort_where(|layer| context.is_enabled(layer));

        let params = RangeParams::new(context.range(), context.aoi());
        for layer in context.enabled_layers() {
            let token = self.slots.issue(layer.clone());
            let layer = layer.clone();
            let context = Arc::clone(context);
            let params = params.clone();
            let backend = Arc::clone(backend);
            let events = events.clone();
            debug!("[tiles] dispatch {} gen={} {}", layer, token.generation(), params.start_date);
            tokio::spawn(async move {
                let result = run_cancellable(&token, backend.tile_url(&layer, &params)).await;
                let outcome = TileOutcome {
                    layer,
                    generation: token.generation(),
                    context,
                    result,
                };
                let _ = events.send(CoreEvent::Tile(outcome)).await;
            });
        }
        context.enabled_layers().len()
    }

    /// Merge an arriving result into `view`.
    pub fn on_fetched(
        &mut self,
        outcome: TileOutcome,
        active: Option<&QueryContext>,
        view: &mut ViewState,
    ) -> Merge {
        let TileOutcome {
            layer,
            generation,
            context,
            result,
        } = outcome;

        if let Err(e) = &result {
            if e.is_silent() {
                debug!("[tiles] {} gen={} {}", layer, generation, e);
                return Merge::Silent;
            }
        }
        if active != Some(context.as_ref()) || !self.slots.complete(&layer, generation) {
            debug!("[tiles] {} gen={} stale, dropped", layer, generation);
            return Merge::Stale;
        }

        match result {
            Ok(url) => {
                view.tiles.insert(
                    layer.clone(),
                    TileEntry {
                        url,
                        range: *context.range(),
                        clipped: context.aoi().is_some(),
                    },
                );
                view.clear_fault(FetchKind::Tiles, &layer);
                Merge::Published
            }
            Err(e) => {
                warn!("[tiles] {} failed: {}", layer, e);
                let message = e.to_string();
                let fresh = view.set_fault(FetchKind::Tiles, &layer, message.clone());
                Merge::Failed { message, fresh }
            }
        }
    }

    /// Layer switched off: abort its request and drop its tile now.
    pub fn drop_layer(&mut self, layer: &LayerId, view: &mut ViewState) -> bool {
        self.slots.abort(layer);
        let removed = view.tiles.remove(layer).is_some();
        view.clear_fault(FetchKind::Tiles, layer);
        removed
    }

    pub fn shutdown(&mut self) -> usize {
        self.slots.abort_all()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }
}
