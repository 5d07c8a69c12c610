use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecesError>;

/// Errors returned by the death records API client.
#[derive(Debug, Error)]
pub enum DecesError {
    /// The API answered with a non-success status. Carries the HTTP status
    /// and the raw response body for diagnostics.
    #[error("deces API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport-level failure (connect, timeout, body decode).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
