mod orchestrator;
mod resumable;

pub use orchestrator::UploadOrchestrator;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytesize::ByteSize;
use reqwest::Client;
use tracing::debug;

use crate::config::{ApiEndpoint, AttachmentLimits};
use crate::core::{FetchedFile, UploadedFileHandle};
use crate::error::AttachmentError;
use crate::telemetry::RunMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// Bytes travel base64-encoded inside the generation request.
    Inline,
    /// Resumable upload to the Files API, referenced by URI.
    Remote,
}

/// `None` when the file is above the ceiling and must not be uploaded at all.
pub fn choose_strategy(size: u64, limits: &AttachmentLimits) -> Option<UploadStrategy> {
    if size <= limits.inline_threshold {
        Some(UploadStrategy::Inline)
    } else if size <= limits.max_file_size {
        Some(UploadStrategy::Remote)
    } else {
        None
    }
}

/// Sends one fetched file down the inline or the resumable path.
pub struct FileUploader {
    http: Client,
    endpoint: ApiEndpoint,
    api_key: String,
    limits: AttachmentLimits,
    monitor: RunMonitor,
}

impl FileUploader {
    pub fn new(
        http: Client,
        endpoint: ApiEndpoint,
        api_key: String,
        limits: AttachmentLimits,
        monitor: RunMonitor,
    ) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            limits,
            monitor,
        }
    }

    pub async fn upload(&self, file: &FetchedFile) -> Result<UploadedFileHandle, AttachmentError> {
        let strategy =
            choose_strategy(file.size(), &self.limits).ok_or_else(|| AttachmentError::TooLarge {
                name: file.file_name.clone(),
                size: file.size(),
                limit: self.limits.max_file_size,
            })?;
        debug!(
            file = %file.file_name,
            size = %ByteSize::b(file.size()),
            strategy = ?strategy,
            "uploading attachment"
        );
        match strategy {
            UploadStrategy::Inline => Ok(encode_inline(file)),
            UploadStrategy::Remote => self.upload_remote(file).await,
        }
    }
}

pub fn encode_inline(file: &FetchedFile) -> UploadedFileHandle {
    UploadedFileHandle::Inline {
        display_name: file.file_name.clone(),
        mime_type: file.mime_type.clone(),
        base64_data: BASE64.encode(&file.data),
    }
}
