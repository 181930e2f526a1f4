use std::time::Duration;

use thiserror::Error;

use crate::constants::API_KEY_ENV;

/// Failures surfaced to the caller of a generation action.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key not configured (set {API_KEY_ENV} or api_key in the config file)")]
    MissingApiKey,

    #[error("generateContent was rate limited (HTTP 429) on attempt {attempts}: {body}")]
    RateLimited { attempts: u32, body: String },

    #[error("generateContent failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no response content received: {0}")]
    MalformedResponse(String),

    #[error("calling generateContent: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GenerationError {
    /// Configuration problems are final; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::MissingApiKey)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }
}

/// Per-file failures. These never leave the upload orchestrator.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("{name} is {size} bytes, above the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("malformed data URL for {name}: {reason}")]
    MalformedDataUrl { name: String, reason: String },

    #[error("fetching {name} returned status {status}")]
    FetchStatus { name: String, status: u16 },

    #[error("{name} could not be retrieved")]
    Unavailable { name: String },

    #[error("upload start for {name} returned no X-Goog-Upload-URL header")]
    MissingUploadUrl { name: String },

    #[error("files:upload {stage} for {name} failed with status {status}: {body}")]
    UploadStatus {
        name: String,
        stage: &'static str,
        status: u16,
        body: String,
    },

    #[error("remote file {remote_name} reported state FAILED")]
    ProcessingFailed { remote_name: String },

    #[error("remote file {remote_name} was not ACTIVE after {waited:?}")]
    ProcessingTimeout { remote_name: String, waited: Duration },

    #[error("unexpected upload response for {name}: {reason}")]
    UnexpectedResponse { name: String, reason: String },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
