use crate::recorder::InfluxRecorder;
use thiserror::Error;

/// Outcome of a single write request.
pub type WriteResult = Result<(), InfluxError>;

#[derive(Error, Debug)]
pub enum InfluxError {
    #[error("no database set")]
    NoDatabase,
    #[error("invalid write endpoint {url}: {reason}")]
    Endpoint { url: String, reason: String },
    #[error("no tokio runtime to dispatch writes on: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The database answered with something other than `204 No Content`.
    /// Displays as the raw response body.
    #[error("{body}")]
    Rejected { status: u16, body: String },
    #[error("write task was dropped before it completed")]
    Canceled,
    #[error("failed to set InfluxRecorder: {0}")]
    Recorder(#[from] metrics::SetRecorderError<InfluxRecorder>),
}
