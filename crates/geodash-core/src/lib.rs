//! Query orchestration for the satellite-layer explorer.
//!
//! Turns user state (layers, date range, area of interest, map clicks)
//! into backend requests, and merges their results so that a superseded
//! request can never overwrite a fresher one.

pub mod aoi;
pub mod backend;
pub mod context;
pub mod core;
pub mod error;
pub mod http;
pub mod layers;
pub mod pixel;
pub mod stats;
pub mod tiles;
pub mod token;
pub mod view;

pub use crate::backend::{Backend, HttpBackend};
pub use crate::context::{build_context, QueryContext};
pub use crate::core::{Action, CoreBroadcast, CoreEvent, QueryCore, Severity};
pub use crate::error::FetchError;
pub use crate::view::{SharedView, ViewState};
