//! Stats coordinator: min/max (and optionally a trailing 12-month
//! series) per enabled layer.
//!
//! Same dispatch, staleness and merge discipline as the tile coordinator,
//! always driven with the same context so both layer sets stay in lockstep.
//! The series is optional: when it fails the min/max still publish, with
//! an empty series.

use std::sync::Arc;

use futures_util::future;
use geodash_proto::protocol::{pad_series, RangeParams, TimePoint};
use geodash_proto::{DateRange, LayerId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::context::QueryContext;
use crate::core::CoreEvent;
use crate::error::FetchError;
use crate::tiles::Merge;
use crate::token::{run_cancellable, SlotRegistry};
use crate::view::{FetchKind, StatsEntry, ViewState};

/// Length of the trailing series window.
pub const SERIES_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct LayerStats {
    pub min: f64,
    pub max: f64,
    pub series: Vec<TimePoint>,
}

#[derive(Debug, Clone)]
pub struct StatsOutcome {
    pub layer: LayerId,
    pub generation: u64,
    pub context: Arc<QueryContext>,
    pub result: Result<LayerStats, FetchError>,
}

#[derive(Debug, Default)]
pub struct StatsCoordinator {
    slots: SlotRegistry<LayerId>,
    with_series: bool,
}

impl StatsCoordinator {
    pub fn new(with_series: bool) -> Self {
        Self {
            slots: SlotRegistry::new(),
            with_series,
        }
    }

    pub fn refresh(
        &mut self,
        context: &Arc<QueryContext>,
        backend: &Arc<dyn Backend>,
        events: &mpsc::Sender<CoreEvent>,
    ) -> usize {
        self.slots.abort_where(|layer| context.is_enabled(layer));

        let params = RangeParams::new(context.range(), context.aoi());
        let window = context.end_month().trailing(SERIES_MONTHS);
        let series_params = self.with_series.then(|| {
            let range = DateRange::new(window[0], context.end_month())
                .unwrap_or_else(|_| DateRange::single(context.end_month()));
            RangeParams::new(&range, context.aoi())
        });

        for layer in context.enabled_layers() {
            let token = self.slots.issue(layer.clone());
            let layer = layer.clone();
            let context = Arc::clone(context);
            let params = params.clone();
            let series_params = series_params.clone();
            let window = window.clone();
            let backend = Arc::clone(backend);
            let events = events.clone();
            debug!("[stats] dispatch {} gen={}", layer, token.generation());
            tokio::spawn(async move {
                let fetch = async {
                    let (bounds, series) = match &series_params {
                        Some(sp) => {
                            let (bounds, points) = future::join(
                                backend.legend_stats(&layer, &params),
                                backend.layer_series(&layer, sp),
                            )
                            .await;
                            let series = match points {
                                Ok(points) => pad_series(&window, &points),
                                Err(e) => {
                                    warn!("[stats] {} series unavailable: {}", layer, e);
                                    Vec::new()
                                }
                            };
                            (bounds?, series)
                        }
                        None => (backend.legend_stats(&layer, &params).await?, Vec::new()),
                    };
                    Ok::<_, FetchError>(LayerStats {
                        min: bounds.min,
                        max: bounds.max,
                        series,
                    })
                };
                let result = run_cancellable(&token, fetch).await;
                let outcome = StatsOutcome {
                    layer,
                    generation: token.generation(),
                    context,
                    result,
                };
                let _ = events.send(CoreEvent::Stats(outcome)).await;
            });
        }
        context.enabled_layers().len()
    }

    pub fn on_fetched(
        &mut self,
        outcome: StatsOutcome,
        active: Option<&QueryContext>,
        view: &mut ViewState,
    ) -> Merge {
        let StatsOutcome {
            layer,
            generation,
            context,
            result,
        } = outcome;

        if let Err(e) = &result {
            if e.is_silent() {
                debug!("[stats] {} gen={} {}", layer, generation, e);
                return Merge::Silent;
            }
        }
        if active != Some(context.as_ref()) || !self.slots.complete(&layer, generation) {
            debug!("[stats] {} gen={} stale, dropped", layer, generation);
            return Merge::Stale;
        }

        match result {
            Ok(stats) => {
                view.stats.insert(
                    layer.clone(),
                    StatsEntry {
                        min: stats.min,
                        max: stats.max,
                        range: *context.range(),
                        series: stats.series,
                    },
                );
                view.clear_fault(FetchKind::Stats, &layer);
                Merge::Published
            }
            Err(e) => {
                warn!("[stats] {} failed: {}", layer, e);
                let message = e.to_string();
                let fresh = view.set_fault(FetchKind::Stats, &layer, message.clone());
                Merge::Failed { message, fresh }
            }
        }
    }

    pub fn drop_layer(&mut self, layer: &LayerId, view: &mut ViewState) -> bool {
        self.slots.abort(layer);
        let removed = view.stats.remove(layer).is_some();
        view.clear_fault(FetchKind::Stats, layer);
        removed
    }

    pub fn shutdown(&mut self) -> usize {
        self.slots.abort_all()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }
}
