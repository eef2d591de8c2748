use thiserror::Error;

/// Errors surfaced by every public operation. None are retried.
#[derive(Debug, Error)]
pub enum PopError {
    /// Bad geography/product/breakdown combination, detected before any network call.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transport failure, non-2xx status, or a body that does not have the expected shape.
    #[error("Upstream request failed: {0}")]
    UpstreamRequestFailed(String),

    /// A code returned by the provider has no entry in the local label table.
    #[error("Unknown {dimension} code {code} for vintage {vintage}")]
    UnknownBreakdownCode {
        dimension: String,
        code: u32,
        vintage: u16,
    },

    /// GeoJSON that cannot be turned into a GEOID-keyed geometry map.
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Table error: {0}")]
    Table(#[from] polars::prelude::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PopError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PopError::UpstreamRequestFailed(format!("request timeout: {e}"))
        } else if e.is_connect() {
            PopError::UpstreamRequestFailed(format!("failed to connect: {e}"))
        } else {
            PopError::UpstreamRequestFailed(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PopError {
    fn from(e: serde_json::Error) -> Self {
        PopError::UpstreamRequestFailed(format!("malformed response body: {e}"))
    }
}

impl From<zip::result::ZipError> for PopError {
    fn from(e: zip::result::ZipError) -> Self {
        PopError::UpstreamRequestFailed(format!("unreadable archive: {e}"))
    }
}

impl PopError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        PopError::UpstreamRequestFailed(format!("malformed response: {}", msg.into()))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PopError::InvalidParameter(msg.into())
    }
}

/// Result type for popflows operations.
pub type Result<T> = std::result::Result<T, PopError>;
