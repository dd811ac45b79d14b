use thiserror::Error;

/// Why a backend request produced no value.
///
/// `Cancelled` and `Aborted` are expected outcomes of supersession and
/// teardown; they are never shown to the user or logged as failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The request never produced a response (connect error, reset, ...).
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// Non-success status, or a success status with an unusable body.
    #[error("backend error{}: {detail}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    BackendError { status: Option<u16>, detail: String },
    /// A newer request took over the slot.
    #[error("superseded by a newer request")]
    Cancelled,
    /// The slot was explicitly shut (layer disabled, popup closed, teardown).
    #[error("request aborted")]
    Aborted,
}

impl FetchError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::BackendError {
            status: None,
            detail: detail.into(),
        }
    }

    /// True for outcomes that must be swallowed without a user-visible trace.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_classification() {
        assert!(FetchError::Cancelled.is_silent());
        assert!(FetchError::Aborted.is_silent());
        assert!(!FetchError::NetworkFailure("refused".into()).is_silent());
        assert!(!FetchError::malformed("no tile_url").is_silent());
    }

    #[test]
    fn test_display_includes_status() {
        let err = FetchError::BackendError {
            status: Some(500),
            detail: "Earth Engine error".into(),
        };
        assert_eq!(err.to_string(), "backend error (500): Earth Engine error");
        assert_eq!(
            FetchError::malformed("bad json").to_string(),
            "backend error: bad json"
        );
    }
}
