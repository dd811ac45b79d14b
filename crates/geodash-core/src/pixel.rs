//! Pixel coordinator: single-slot, per-click value lookup.
//!
//! Each click bumps a sequence counter, supersedes the outstanding request
//! and shows a pending placeholder straight away.  A completion is
//! published only when its sequence equals the latest issued one; arrival
//! order is irrelevant.
//!
//! The optional point series is a separate request with its own slot, so a
//! slow series never holds the values back.  It attaches to the popup of
//! its own click once the values are in.

use std::collections::BTreeMap;
use std::sync::Arc;

use geodash_proto::protocol::{PixelParams, PixelResponse, PointSeriesResponse, TimePoint};
use geodash_proto::{DateRange, LayerId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::core::CoreEvent;
use crate::error::FetchError;
use crate::tiles::Merge;
use crate::token::{run_cancellable, SlotRegistry};
use crate::view::{PixelQuery, PixelSlot, PixelValues, ViewState};

pub type PointSeries = BTreeMap<LayerId, Vec<TimePoint>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Part {
    Values,
    Series,
}

#[derive(Debug, Clone)]
pub struct PixelOutcome {
    pub sequence: u64,
    pub generation: u64,
    pub result: Result<PixelValues, FetchError>,
}

#[derive(Debug, Clone)]
pub struct PixelSeriesOutcome {
    pub sequence: u64,
    pub generation: u64,
    pub result: Result<PointSeries, FetchError>,
}

#[derive(Debug)]
pub struct PixelCoordinator {
    latest: u64,
    slots: SlotRegistry<Part>,
    layers: Vec<LayerId>,
    with_series: bool,
    /// Series that landed before its click's values did.
    early_series: Option<(u64, PointSeries)>,
}

impl PixelCoordinator {
    /// `layers` is the registry the `<layer>_value` keys are read for.
    pub fn new(layers: Vec<LayerId>, with_series: bool) -> Self {
        Self {
            latest: 0,
            slots: SlotRegistry::new(),
            layers,
            with_series,
            early_series: None,
        }
    }

    pub fn click(
        &mut self,
        lat: f64,
        lng: f64,
        range: DateRange,
        backend: &Arc<dyn Backend>,
        events: &mpsc::Sender<CoreEvent>,
        view: &mut ViewState,
    ) -> PixelQuery {
        self.latest += 1;
        self.early_series = None;
        let query = PixelQuery {
            lat,
            lng,
            range,
            sequence: self.latest,
        };
        view.pixel = PixelSlot::Pending {
            query: query.clone(),
        };
        debug!("[pixel] click seq={} at ({}, {})", query.sequence, lat, lng);

        let sequence = query.sequence;
        let params = PixelParams {
            lat,
            lng,
            start_date: range.start().to_string(),
            end_date: range.end().to_string(),
        };
        let token = self.slots.issue(Part::Values);
        let layers = self.layers.clone();
        let backend_values = Arc::clone(backend);
        let events_values = events.clone();
        tokio::spawn(async move {
            let fetch = async {
                let body = backend_values.pixel_value(&params).await?;
                Ok::<_, FetchError>(extract_values(&layers, &body))
            };
            let result = run_cancellable(&token, fetch).await;
            let outcome = PixelOutcome {
                sequence,
                generation: token.generation(),
                result,
            };
            let _ = events_values.send(CoreEvent::Pixel(outcome)).await;
        });

        if self.with_series {
            let token = self.slots.issue(Part::Series);
            let layers = self.layers.clone();
            let backend = Arc::clone(backend);
            let events = events.clone();
            tokio::spawn(async move {
                let fetch = async {
                    let body = backend.point_series(lat, lng).await?;
                    Ok::<_, FetchError>(extract_series(&layers, &body))
                };
                let result = run_cancellable(&token, fetch).await;
                let outcome = PixelSeriesOutcome {
                    sequence,
                    generation: token.generation(),
                    result,
                };
                let _ = events.send(CoreEvent::PixelSeries(outcome)).await;
            });
        }

        query
    }

    pub fn on_fetched(&mut self, outcome: PixelOutcome, view: &mut ViewState) -> Merge {
        let PixelOutcome {
            sequence,
            generation,
            result,
        } = outcome;

        if let Err(e) = &result {
            if e.is_silent() {
                debug!("[pixel] seq={} {}", sequence, e);
                return Merge::Silent;
            }
        }
        if sequence != self.latest {
            debug!("[pixel] seq={} stale (latest={}), dropped", sequence, self.latest);
            return Merge::Stale;
        }
        let Some(query) = view
            .pixel
            .query()
            .filter(|q| q.sequence == sequence && view.pixel.is_pending())
            .cloned()
        else {
            debug!("[pixel] seq={} slot no longer waits for it, dropped", sequence);
            return Merge::Stale;
        };
        if !self.slots.complete(&Part::Values, generation) {
            return Merge::Stale;
        }

        match result {
            Ok(mut values) => {
                info!("[pixel] seq={} resolved", sequence);
                if let Some((seq, series)) = self.early_series.take() {
                    if seq == sequence {
                        values.series = series;
                    }
                }
                view.pixel = PixelSlot::Resolved { query, values };
                Merge::Published
            }
            Err(e) => {
                warn!("[pixel] seq={} failed: {}", sequence, e);
                self.slots.abort(&Part::Series);
                self.early_series = None;
                let message = e.to_string();
                view.pixel = PixelSlot::Errored {
                    query,
                    message: message.clone(),
                };
                Merge::Failed {
                    message,
                    fresh: true,
                }
            }
        }
    }

    /// Attach a point series to its click.  A failed series leaves the
    /// popup as it is.
    pub fn on_series_fetched(&mut self, outcome: PixelSeriesOutcome, view: &mut ViewState) -> Merge {
        let PixelSeriesOutcome {
            sequence,
            generation,
            result,
        } = outcome;

        if let Err(e) = &result {
            if e.is_silent() {
                debug!("[pixel] series seq={} {}", sequence, e);
                return Merge::Silent;
            }
        }
        if sequence != self.latest || !self.slots.complete(&Part::Series, generation) {
            debug!("[pixel] series seq={} stale, dropped", sequence);
            return Merge::Stale;
        }
        let series = match result {
            Ok(series) => series,
            Err(e) => {
                warn!("[pixel] seq={} series unavailable: {}", sequence, e);
                return Merge::Silent;
            }
        };

        match &mut view.pixel {
            PixelSlot::Resolved { query, values } if query.sequence == sequence => {
                values.series = series;
                Merge::Published
            }
            PixelSlot::Pending { query } if query.sequence == sequence => {
                self.early_series = Some((sequence, series));
                Merge::Held
            }
            _ => Merge::Stale,
        }
    }

    /// Abort the outstanding query, if any.  Returns whether anything
    /// observable changed; cancelling a settled or empty slot is a no-op.
    pub fn cancel(&mut self, view: &mut ViewState) -> bool {
        self.slots.abort(&Part::Series);
        self.early_series = None;
        if !self.slots.abort(&Part::Values) {
            return false;
        }
        match &view.pixel {
            PixelSlot::Pending { query } if query.sequence == self.latest => {
                view.pixel = PixelSlot::Cancelled {
                    query: query.clone(),
                };
                true
            }
            _ => false,
        }
    }

    /// Popup closed: abort and return to `Idle`.
    pub fn dismiss(&mut self, view: &mut ViewState) -> bool {
        self.slots.abort_all();
        self.early_series = None;
        let changed = view.pixel != PixelSlot::Idle;
        view.pixel = PixelSlot::Idle;
        changed
    }
}

fn extract_values(layers: &[LayerId], body: &PixelResponse) -> PixelValues {
    PixelValues {
        values: layers
            .iter()
            .map(|l| (l.clone(), body.value_for(l)))
            .collect::<BTreeMap<_, _>>(),
        series: BTreeMap::new(),
    }
}

fn extract_series(layers: &[LayerId], body: &PointSeriesResponse) -> PointSeries {
    layers
        .iter()
        .filter_map(|l| body.0.get(l.as_str()).map(|points| (l.clone(), points.clone())))
        .collect()
}
