//! QueryCore: single-owner event loop for all query state.
//!
//! Every mutation (user actions and fetch completions alike) arrives as a
//! `CoreEvent` on one mpsc channel and is applied synchronously by this
//! loop.  Fetch tasks run concurrently on the runtime but never touch
//! state; they only send their outcome back here.  The only suspension
//! point is `recv().await`, so two merges for the same slot can never
//! interleave.
//!
//! After each event that changes the view, the loop copies `ViewState` into
//! the shared snapshot and broadcasts `CoreBroadcast::StateUpdated`.

use std::sync::Arc;

use geodash_proto::config::Config;
use geodash_proto::{DateRange, LayerId, Polygon, ProtoError};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::aoi::AoiState;
use crate::backend::Backend;
use crate::context::{build_context, QueryContext};
use crate::layers::LayerSet;
use crate::pixel::{PixelCoordinator, PixelOutcome, PixelSeriesOutcome};
use crate::stats::{StatsCoordinator, StatsOutcome};
use crate::tiles::{Merge, TileCoordinator, TileOutcome};
use crate::view::{AoiView, FetchKind, SharedView, ViewState};

// ── Events ────────────────────────────────────────────────────────────────────

/// All inputs into the QueryCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// A user interaction from the CLI or HTTP surface.
    Action(Action),
    Tile(TileOutcome),
    Stats(StatsOutcome),
    Pixel(PixelOutcome),
    PixelSeries(PixelSeriesOutcome),
    /// Tear down: abort everything in flight and stop.
    Shutdown,
}

/// User interactions, as emitted by the controls.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetLayer { layer: LayerId, enabled: bool },
    ToggleLayer(LayerId),
    SetOpacity { layer: LayerId, opacity: f32 },
    SetRange(DateRange),
    ToggleDrawing,
    CancelDrawing,
    GeometryDrawn(Polygon),
    ApplyAoi,
    ClearAoi,
    MapClick { lat: f64, lng: f64 },
    DismissPixel,
    /// Re-dispatch for the current context even if nothing changed.
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What the core tells its front ends.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreBroadcast {
    /// The shared view changed; carries its new `rev`.
    StateUpdated(u64),
    /// A transient, user-visible message (toast).
    Notice { severity: Severity, message: String },
}

// ── QueryCore ─────────────────────────────────────────────────────────────────

pub struct QueryCore {
    backend: Arc<dyn Backend>,
    layers: LayerSet,
    range: DateRange,
    aoi: AoiState,
    /// Geometry the active context was built with.
    applied_aoi: Option<Polygon>,
    active: Option<Arc<QueryContext>>,
    tiles: TileCoordinator,
    stats: StatsCoordinator,
    pixel: PixelCoordinator,
    view: ViewState,
    shared: SharedView,
    /// Fetch tasks report here.  Weak, so the loop ends once every outside
    /// sender and every in-flight task is gone.
    events: mpsc::WeakSender<CoreEvent>,
    broadcast_tx: broadcast::Sender<CoreBroadcast>,
    /// Total backend requests issued by the tile and stats coordinators.
    dispatches: u64,
    shut_down: bool,
}

impl QueryCore {
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        events: mpsc::Sender<CoreEvent>,
        broadcast_tx: broadcast::Sender<CoreBroadcast>,
    ) -> Self {
        let layers = LayerSet::from_config(&config.layers);
        let pixel = PixelCoordinator::new(layers.ids(), config.query.pixel_timeseries);
        let mut core = Self {
            backend,
            range: config.query.date_range(),
            aoi: AoiState::new(),
            applied_aoi: None,
            active: None,
            tiles: TileCoordinator::new(),
            stats: StatsCoordinator::new(config.query.timeseries),
            pixel,
            layers,
            view: ViewState::default(),
            shared: Arc::new(RwLock::new(ViewState::default())),
            events: events.downgrade(),
            broadcast_tx,
            dispatches: 0,
            shut_down: false,
        };
        core.sync_view();
        core
    }

    /// Handle to the snapshot readers see (HTTP surface, front ends).
    pub fn shared_view(&self) -> SharedView {
        Arc::clone(&self.shared)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn active_context(&self) -> Option<&QueryContext> {
        self.active.as_deref()
    }

    pub fn aoi(&self) -> &AoiState {
        &self.aoi
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Issue the initial query.  Returns the number of requests dispatched.
    pub fn start(&mut self) -> usize {
        let n = self.requery(true);
        self.sync_view();
        n
    }

    /// Run the core event loop.  Returns after a `Shutdown` event, or once
    /// every sender of `event_rx` is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!("QueryCore: starting event loop");
        self.start();
        self.publish().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("QueryCore: event channel closed, shutting down");
                    break;
                }
                Some(CoreEvent::Shutdown) => {
                    info!("QueryCore: shutdown requested");
                    break;
                }
                Some(evt) => {
                    if self.handle_event(evt) {
                        self.publish().await;
                    }
                }
            }
        }

        self.shutdown();
        self.publish().await;
        Ok(())
    }

    /// Apply one event.  Returns `true` when the view changed.
    pub fn handle_event(&mut self, evt: CoreEvent) -> bool {
        let changed = match evt {
            CoreEvent::Action(action) => {
                if self.shut_down {
                    debug!("QueryCore: ignoring {:?} after shutdown", action);
                    return false;
                }
                debug!("QueryCore: action {:?}", action);
                match self.apply_action(action) {
                    Ok(changed) => changed,
                    Err(e) => {
                        warn!("QueryCore: rejected action: {}", e);
                        self.notify(Severity::Error, e.to_string());
                        false
                    }
                }
            }
            CoreEvent::Tile(outcome) => {
                let layer = outcome.layer.clone();
                let merge = self
                    .tiles
                    .on_fetched(outcome, self.active.as_deref(), &mut self.view);
                self.after_merge(FetchKind::Tiles, &layer, merge)
            }
            CoreEvent::Stats(outcome) => {
                let layer = outcome.layer.clone();
                let merge = self
                    .stats
                    .on_fetched(outcome, self.active.as_deref(), &mut self.view);
                self.after_merge(FetchKind::Stats, &layer, merge)
            }
            CoreEvent::Pixel(outcome) => {
                matches!(
                    self.pixel.on_fetched(outcome, &mut self.view),
                    Merge::Published | Merge::Failed { .. }
                )
            }
            CoreEvent::PixelSeries(outcome) => {
                self.pixel.on_series_fetched(outcome, &mut self.view) == Merge::Published
            }
            CoreEvent::Shutdown => {
                self.shutdown();
                true
            }
        };
        if changed {
            self.sync_view();
        }
        changed
    }

    fn apply_action(&mut self, action: Action) -> Result<bool, ProtoError> {
        match action {
            Action::SetLayer { layer, enabled } => {
                if !self.layers.set_enabled(&layer, enabled)? {
                    return Ok(false);
                }
                self.on_layer_switched(&layer, enabled);
                Ok(true)
            }
            Action::ToggleLayer(layer) => {
                let enabled = self.layers.toggle(&layer)?;
                self.on_layer_switched(&layer, enabled);
                Ok(true)
            }
            Action::SetOpacity { layer, opacity } => {
                let before = self.layers.get(&layer).map(|l| l.opacity);
                let after = self.layers.set_opacity(&layer, opacity)?;
                Ok(before != Some(after))
            }
            Action::SetRange(range) => {
                if range == self.range {
                    return Ok(false);
                }
                info!("QueryCore: range {}", range);
                self.range = range;
                self.requery(false);
                Ok(true)
            }
            Action::ToggleDrawing => {
                self.aoi.toggle_drawing();
                Ok(true)
            }
            Action::CancelDrawing => {
                let before = self.aoi.clone();
                self.aoi.cancel_drawing();
                Ok(before != self.aoi)
            }
            Action::GeometryDrawn(polygon) => {
                self.aoi.on_geometry_drawn(polygon);
                Ok(true)
            }
            Action::ApplyAoi => {
                let Some(geometry) = self.aoi.pending_apply().cloned() else {
                    return Ok(false);
                };
                info!("QueryCore: applying AOI");
                self.applied_aoi = Some(geometry);
                self.requery(false);
                self.aoi.mark_applied();
                Ok(true)
            }
            Action::ClearAoi => {
                let had_drawn = self.aoi != AoiState::new();
                self.aoi.clear();
                if self.applied_aoi.take().is_some() {
                    info!("QueryCore: AOI cleared");
                    self.requery(false);
                    return Ok(true);
                }
                Ok(had_drawn)
            }
            Action::MapClick { lat, lng } => {
                if !lat.is_finite() || !lng.is_finite() || !(-90.0..=90.0).contains(&lat) {
                    return Err(ProtoError::InvalidCoordinate { lat, lng });
                }
                let Some(events) = self.events.upgrade() else {
                    debug!("QueryCore: event channel closed, click ignored");
                    return Ok(false);
                };
                self.pixel
                    .click(lat, lng, self.range, &self.backend, &events, &mut self.view);
                Ok(true)
            }
            Action::DismissPixel => Ok(self.pixel.dismiss(&mut self.view)),
            Action::Refresh => {
                self.requery(true);
                Ok(true)
            }
        }
    }

    fn on_layer_switched(&mut self, layer: &LayerId, enabled: bool) {
        info!("QueryCore: layer {} {}", layer, if enabled { "on" } else { "off" });
        if !enabled {
            // Gone from the map now, not when the in-flight request settles.
            self.tiles.drop_layer(layer, &mut self.view);
            self.stats.drop_layer(layer, &mut self.view);
        }
        self.requery(false);
    }

    /// Build the context from current state and, unless it equals the
    /// active one, make it active and re-run both coordinators with it.
    fn requery(&mut self, force: bool) -> usize {
        let context = build_context(&self.layers, self.range, self.applied_aoi.as_ref());
        if !force && self.active.as_deref() == Some(&context) {
            debug!("QueryCore: context unchanged, nothing to dispatch");
            return 0;
        }
        let Some(events) = self.events.upgrade() else {
            debug!("QueryCore: event channel closed, nothing dispatched");
            return 0;
        };
        let context = Arc::new(context);
        self.active = Some(Arc::clone(&context));
        let n = self.tiles.refresh(&context, &self.backend, &events)
            + self.stats.refresh(&context, &self.backend, &events);
        self.dispatches += n as u64;
        debug!(
            "QueryCore: {} requests for {} ({} layers, aoi={})",
            n,
            context.range(),
            context.enabled_layers().len(),
            context.aoi().is_some()
        );
        n
    }

    fn after_merge(&mut self, kind: FetchKind, layer: &LayerId, merge: Merge) -> bool {
        match merge {
            Merge::Published => true,
            Merge::Failed { fresh: false, .. } => false,
            Merge::Failed { message, .. } => {
                let title = self
                    .layers
                    .get(layer)
                    .map(|l| l.title.clone())
                    .unwrap_or_else(|| layer.to_string());
                let what = match kind {
                    FetchKind::Tiles => "tiles",
                    FetchKind::Stats => "stats",
                };
                self.notify(
                    Severity::Warning,
                    format!("{} {} unavailable: {}", title, what, message),
                );
                true
            }
            Merge::Stale | Merge::Silent | Merge::Held => false,
        }
    }

    /// Abort every slot; nothing is published afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let aborted = self.tiles.shutdown() + self.stats.shutdown();
        self.pixel.cancel(&mut self.view);
        info!("QueryCore: shut down, aborted {} layer requests", aborted);
        self.sync_view();
    }

    fn notify(&self, severity: Severity, message: String) {
        let _ = self
            .broadcast_tx
            .send(CoreBroadcast::Notice { severity, message });
    }

    fn sync_view(&mut self) {
        self.view.rev += 1;
        self.view.context = self.active.as_deref().cloned();
        self.view.layers = self.layers.iter().cloned().collect();
        self.view.aoi = AoiView {
            drawing_enabled: self.aoi.drawing_enabled(),
            geometry: self.aoi.geometry().cloned(),
            committed: self.aoi.committed(),
            applied: self.applied_aoi.clone(),
        };
    }

    async fn publish(&mut self) {
        let rev = self.view.rev;
        *self.shared.write().await = self.view.clone();
        let _ = self.broadcast_tx.send(CoreBroadcast::StateUpdated(rev));
    }
}
