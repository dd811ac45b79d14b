//! Shared value types, backend wire format and configuration for geodash.

pub mod config;
pub mod error;
pub mod geometry;
pub mod month;
pub mod platform;
pub mod protocol;

pub use error::ProtoError;
pub use geometry::Polygon;
pub use month::{DateRange, Month};
pub use protocol::LayerId;
