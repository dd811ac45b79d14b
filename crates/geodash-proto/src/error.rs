use thiserror::Error;

/// Rejected user or config input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtoError {
    #[error("dates must be in YYYY-MM format, got {0:?}")]
    InvalidMonth(String),
    #[error("start month {start} is after end month {end}")]
    InvertedRange { start: String, end: String },
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),
    #[error("unknown layer {0:?}")]
    UnknownLayer(String),
    #[error("invalid layer id {0:?}")]
    InvalidLayerId(String),
    #[error("invalid coordinate lat={lat} lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },
}
