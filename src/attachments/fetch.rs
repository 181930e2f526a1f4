use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::data_url;
use super::intercept::{intercept_within, DetectOnlyInterceptor};
use crate::config::AttachmentLimits;
use crate::core::{AccessHandle, AttachmentDescriptor, DownloadInterceptor, FetchedFile};
use crate::error::AttachmentError;

const OCTET_STREAM: &str = "application/octet-stream";

/// Turns a candidate into bytes, or a definitive "unavailable".
pub struct AttachmentFetcher {
    http: Client,
    max_bytes: u64,
    fallback_wait: Duration,
    interceptor: Arc<dyn DownloadInterceptor>,
}

impl AttachmentFetcher {
    pub fn new(http: Client, limits: &AttachmentLimits) -> Self {
        Self {
            http,
            max_bytes: limits.max_file_size,
            fallback_wait: limits.download_wait,
            interceptor: Arc::new(DetectOnlyInterceptor),
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn DownloadInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    pub async fn fetch(
        &self,
        descriptor: &AttachmentDescriptor,
    ) -> Result<FetchedFile, AttachmentError> {
        match &descriptor.handle {
            AccessHandle::DataUrl(raw) => self.decode_inline(descriptor, raw),
            AccessHandle::Url(raw) => match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    match self.fetch_remote(descriptor, &url).await {
                        Err(AttachmentError::Http(err)) => {
                            debug!(
                                file = %descriptor.file_name,
                                error = %err,
                                "direct fetch failed, trying download fallback"
                            );
                            self.fallback(descriptor).await
                        }
                        other => other,
                    }
                }
                Ok(url) if url.scheme() == "file" => self.read_local(descriptor, &url).await,
                _ => self.fallback(descriptor).await,
            },
            AccessHandle::Missing => self.fallback(descriptor).await,
        }
    }

    fn decode_inline(
        &self,
        descriptor: &AttachmentDescriptor,
        raw: &str,
    ) -> Result<FetchedFile, AttachmentError> {
        let decoded = data_url::decode(raw).map_err(|reason| AttachmentError::MalformedDataUrl {
            name: descriptor.file_name.clone(),
            reason,
        })?;
        self.check_size(&descriptor.file_name, decoded.data.len() as u64)?;
        Ok(FetchedFile::new(
            descriptor.file_name.clone(),
            decoded.mime_type,
            Bytes::from(decoded.data),
        ))
    }

    async fn fetch_remote(
        &self,
        descriptor: &AttachmentDescriptor,
        url: &Url,
    ) -> Result<FetchedFile, AttachmentError> {
        let mut response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::FetchStatus {
                name: descriptor.file_name.clone(),
                status: status.as_u16(),
            });
        }

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if let Some(len) = declared_len {
            self.check_size(&descriptor.file_name, len)?;
        }
        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string());

        let mut buffer = BytesMut::with_capacity(declared_len.unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            self.check_size(&descriptor.file_name, buffer.len() as u64)?;
        }

        let mime_type = resolve_mime(header_mime.as_deref(), &descriptor.file_name);
        debug!(
            file = %descriptor.file_name,
            bytes = buffer.len(),
            mime = %mime_type,
            "fetched attachment"
        );
        Ok(FetchedFile::new(
            descriptor.file_name.clone(),
            mime_type,
            buffer.freeze(),
        ))
    }

    async fn read_local(
        &self,
        descriptor: &AttachmentDescriptor,
        url: &Url,
    ) -> Result<FetchedFile, AttachmentError> {
        let Ok(path) = url.to_file_path() else {
            return self.fallback(descriptor).await;
        };
        let metadata = tokio::fs::metadata(&path).await?;
        self.check_size(&descriptor.file_name, metadata.len())?;
        let data = tokio::fs::read(&path).await?;
        self.check_size(&descriptor.file_name, data.len() as u64)?;
        Ok(FetchedFile::new(
            descriptor.file_name.clone(),
            resolve_mime(None, &descriptor.file_name),
            Bytes::from(data),
        ))
    }

    async fn fallback(
        &self,
        descriptor: &AttachmentDescriptor,
    ) -> Result<FetchedFile, AttachmentError> {
        match intercept_within(self.interceptor.as_ref(), descriptor, self.fallback_wait).await {
            Some(file) => {
                self.check_size(&file.file_name, file.size())?;
                Ok(file)
            }
            None => {
                warn!(file = %descriptor.file_name, "attachment unavailable");
                Err(AttachmentError::Unavailable {
                    name: descriptor.file_name.clone(),
                })
            }
        }
    }

    fn check_size(&self, name: &str, size: u64) -> Result<(), AttachmentError> {
        if size > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                name: name.to_string(),
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Prefer a specific `Content-Type`; fall back to the file extension.
pub fn resolve_mime(header: Option<&str>, file_name: &str) -> String {
    let declared = header
        .and_then(|raw| mime::Mime::from_str(raw).ok())
        .filter(|parsed| parsed.essence_str() != OCTET_STREAM)
        .map(|parsed| parsed.essence_str().to_string());
    declared
        .or_else(|| {
            mime_guess::from_path(file_name)
                .first_raw()
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}
