use serde_json::json;
use tracing::{info, warn};

use super::FileUploader;
use crate::attachments::AttachmentFetcher;
use crate::constants::MAX_UPLOAD_FILES;
use crate::core::{EmailContext, UploadedFileHandle};
use crate::telemetry::RunMonitor;

/// Fetches and uploads the attachments of one email.
///
/// Individual failures are logged and skipped; the caller always gets back
/// whatever subset made it, possibly nothing.
pub struct UploadOrchestrator {
    fetcher: AttachmentFetcher,
    uploader: FileUploader,
    max_files: usize,
    monitor: RunMonitor,
}

impl UploadOrchestrator {
    pub fn new(
        fetcher: AttachmentFetcher,
        uploader: FileUploader,
        max_files: usize,
        monitor: RunMonitor,
    ) -> Self {
        Self {
            fetcher,
            uploader,
            max_files: max_files.min(MAX_UPLOAD_FILES),
            monitor,
        }
    }

    pub async fn upload_all(&self, ctx: &EmailContext) -> Vec<UploadedFileHandle> {
        let candidates = ctx.attachment_files();
        if candidates.is_empty() {
            return Vec::new();
        }
        let selected = &candidates[..candidates.len().min(self.max_files)];
        if selected.len() < candidates.len() {
            let dropped: Vec<&str> = candidates[selected.len()..]
                .iter()
                .map(|d| d.file_name.as_str())
                .collect();
            warn!(
                limit = self.max_files,
                dropped = dropped.len(),
                "attachment limit reached, skipping the rest"
            );
            self.monitor
                .note_event("upload.dropped", json!({ "files": dropped }));
        }

        let mut fetched_count = 0usize;
        let mut handles = Vec::with_capacity(selected.len());
        for descriptor in selected {
            let file = match self.fetcher.fetch(descriptor).await {
                Ok(file) => file,
                Err(err) => {
                    warn!(file = %descriptor.file_name, error = %err, "skipping attachment");
                    continue;
                }
            };
            fetched_count += 1;
            match self.uploader.upload(&file).await {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    warn!(file = %file.file_name, error = %err, "attachment upload failed");
                }
            }
        }

        info!(
            detected = candidates.len(),
            attempted = selected.len(),
            fetched = fetched_count,
            uploaded = handles.len(),
            "attachment upload finished"
        );
        self.monitor.note_event(
            "upload.funnel",
            json!({
                "detected": candidates.len(),
                "attempted": selected.len(),
                "fetched": fetched_count,
                "uploaded": handles.len(),
            }),
        );
        handles
    }
}
