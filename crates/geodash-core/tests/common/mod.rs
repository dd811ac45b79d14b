//! Shared fixtures: a backend whose calls are held until the test answers
//! them, and a harness that drives `QueryCore` one event at a time.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geodash_core::{Backend, CoreBroadcast, CoreEvent, FetchError, QueryCore};
use geodash_proto::config::Config;
use geodash_proto::protocol::{
    LegendStatsResponse, PixelParams, PixelResponse, PointSeriesResponse, RangeParams,
    SeriesResponse, TimePoint,
};
use geodash_proto::{DateRange, LayerId};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};

const WAIT: Duration = Duration::from_secs(5);

/// One backend call, parked until the test replies.
#[derive(Debug)]
pub struct PendingCall {
    /// Path the HTTP client would hit, e.g. `tiles_lst`.
    pub endpoint: String,
    pub range: Option<RangeParams>,
    pub pixel: Option<PixelParams>,
    reply: oneshot::Sender<Result<Value, FetchError>>,
}

impl PendingCall {
    pub fn ok(self, body: Value) {
        let _ = self.reply.send(Ok(body));
    }

    pub fn fail(self, err: FetchError) {
        let _ = self.reply.send(Err(err));
    }

    pub fn tile(self, url: &str) {
        self.ok(json!({ "tile_url": url }));
    }
}

pub struct GatedBackend {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl GatedBackend {
    pub fn new() -> (Arc<dyn Backend>, mpsc::UnboundedReceiver<PendingCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls: tx }), rx)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: String,
        range: Option<RangeParams>,
        pixel: Option<PixelParams>,
    ) -> Result<T, FetchError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall {
            endpoint,
            range,
            pixel,
            reply,
        });
        let body = rx
            .await
            .map_err(|_| FetchError::NetworkFailure("test dropped the call".into()))??;
        serde_json::from_value(body).map_err(|e| FetchError::malformed(e.to_string()))
    }
}

#[async_trait]
impl Backend for GatedBackend {
    async fn tile_url(&self, layer: &LayerId, params: &RangeParams) -> Result<String, FetchError> {
        let body: Value = self
            .call(format!("tiles_{}", layer), Some(params.clone()), None)
            .await?;
        Ok(body["tile_url"].as_str().unwrap_or_default().to_string())
    }

    async fn legend_stats(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<LegendStatsResponse, FetchError> {
        self.call(format!("legend_stats_{}", layer), Some(params.clone()), None)
            .await
    }

    async fn layer_series(
        &self,
        layer: &LayerId,
        params: &RangeParams,
    ) -> Result<Vec<TimePoint>, FetchError> {
        let body: SeriesResponse = self
            .call(format!("timeseries_{}", layer), Some(params.clone()), None)
            .await?;
        Ok(body.points)
    }

    async fn pixel_value(&self, params: &PixelParams) -> Result<PixelResponse, FetchError> {
        self.call("pixel_value".into(), None, Some(params.clone()))
            .await
    }

    async fn point_series(&self, lat: f64, lng: f64) -> Result<PointSeriesResponse, FetchError> {
        let params = PixelParams {
            lat,
            lng,
            start_date: String::new(),
            end_date: String::new(),
        };
        self.call("timeseries".into(), None, Some(params)).await
    }
}

pub fn layer(id: &str) -> LayerId {
    LayerId::new(id).unwrap()
}

pub fn range(start: &str, end: &str) -> DateRange {
    DateRange::parse(start, end).unwrap()
}

/// Default registry (lst, ndvi) with the given layers switched on and the
/// stats series off unless asked for.
pub fn config(enabled: &[&str], timeseries: bool) -> Config {
    let mut config = Config::default();
    for l in &mut config.layers {
        l.enabled = enabled.contains(&l.id.as_str());
    }
    config.query.timeseries = timeseries;
    config
}

pub async fn next_call(calls: &mut mpsc::UnboundedReceiver<PendingCall>) -> PendingCall {
    tokio::time::timeout(WAIT, calls.recv())
        .await
        .expect("timed out waiting for a backend call")
        .expect("backend dropped")
}

/// Wait for `n` calls and return them sorted by endpoint.
pub async fn next_calls(
    calls: &mut mpsc::UnboundedReceiver<PendingCall>,
    n: usize,
) -> Vec<PendingCall> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next_call(calls).await);
    }
    out.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
    out
}

pub async fn next_event(events: &mut mpsc::Receiver<CoreEvent>) -> CoreEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a core event")
        .expect("event channel closed")
}

/// `QueryCore` driven by hand: the test decides when each fetch outcome is
/// merged.
pub struct Harness {
    pub core: QueryCore,
    pub events: mpsc::Receiver<CoreEvent>,
    pub calls: mpsc::UnboundedReceiver<PendingCall>,
    pub notices: broadcast::Receiver<CoreBroadcast>,
    /// Keeps the event channel open; the core only holds a weak handle.
    pub event_tx: mpsc::Sender<CoreEvent>,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        let (backend, calls) = GatedBackend::new();
        let (event_tx, events) = mpsc::channel(256);
        let (broadcast_tx, notices) = broadcast::channel(256);
        let core = QueryCore::new(config, backend, event_tx.clone(), broadcast_tx);
        Self {
            core,
            events,
            calls,
            notices,
            event_tx,
        }
    }

    pub async fn call(&mut self) -> PendingCall {
        next_call(&mut self.calls).await
    }

    pub async fn calls(&mut self, n: usize) -> Vec<PendingCall> {
        next_calls(&mut self.calls, n).await
    }

    /// Merge the next fetch outcome.  Returns whether the view changed.
    pub async fn pump(&mut self) -> bool {
        let evt = next_event(&mut self.events).await;
        self.core.handle_event(evt)
    }

    pub fn send(&mut self, action: geodash_core::Action) -> bool {
        self.core.handle_event(CoreEvent::Action(action))
    }

    /// Let spawned fetch tasks run, then report whether any backend call
    /// is waiting to be picked up.
    pub async fn has_pending_call(&mut self) -> bool {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        !self.calls.is_empty()
    }

    pub fn drain_notices(&mut self) -> Vec<CoreBroadcast> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }
}
