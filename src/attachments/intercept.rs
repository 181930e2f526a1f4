use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{AttachmentDescriptor, DownloadInterceptor, FetchedFile};

/// Sees the download but has no way to recover its bytes, so every
/// candidate that reaches it ends up unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetectOnlyInterceptor;

#[async_trait]
impl DownloadInterceptor for DetectOnlyInterceptor {
    async fn intercept(&self, descriptor: &AttachmentDescriptor) -> Option<FetchedFile> {
        debug!(
            file = %descriptor.file_name,
            has_element = descriptor.element.is_some(),
            "download fallback cannot capture payload"
        );
        None
    }
}

/// Run the interceptor under a hard deadline; a late answer counts as none.
pub async fn intercept_within(
    interceptor: &dyn DownloadInterceptor,
    descriptor: &AttachmentDescriptor,
    wait: Duration,
) -> Option<FetchedFile> {
    match tokio::time::timeout(wait, interceptor.intercept(descriptor)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(
                file = %descriptor.file_name,
                wait_ms = wait.as_millis() as u64,
                "download fallback timed out"
            );
            None
        }
    }
}
