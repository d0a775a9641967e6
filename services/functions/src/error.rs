use thiserror::Error;

/// Errors raised by the link functions and their collaborators
#[derive(Error, Debug)]
pub enum FunctionError {
    /// Network or HTTP failure reaching an external URL
    #[error("{0}")]
    Fetch(#[from] FetchError),

    /// Object store write failure
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Record store write failure
    #[error("Persist failed: {0}")]
    Persist(String),

    /// Missing or malformed request fields
    #[error("{0}")]
    Validation(String),

    /// URL is not a supported Instagram post type
    #[error("Not an Instagram image post")]
    UnsupportedPost,

    /// Credential missing or not resolvable to a user
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// Failures reaching an external URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch URL: {status}")]
    Status { status: u16 },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

impl FunctionError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionError::Fetch(_) => "fetch",
            FunctionError::Upload(_) => "upload",
            FunctionError::Persist(_) => "persist",
            FunctionError::Validation(_) => "validation",
            FunctionError::UnsupportedPost => "unsupported_post",
            FunctionError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status {
                status: status.as_u16(),
            },
            None if e.is_body() || e.is_decode() => FetchError::Body(e.to_string()),
            None => FetchError::Network(e.to_string()),
        }
    }
}
