use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::FileUploader;
use crate::core::{FetchedFile, UploadedFileHandle};
use crate::error::AttachmentError;

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    state: FileState,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

impl FileUploader {
    pub(super) async fn upload_remote(
        &self,
        file: &FetchedFile,
    ) -> Result<UploadedFileHandle, AttachmentError> {
        let session_url = self.start_session(file).await?;
        let uploaded = self.send_bytes(file, &session_url).await?;
        let remote = match uploaded.state {
            FileState::Active => uploaded,
            FileState::Failed => {
                return Err(AttachmentError::ProcessingFailed {
                    remote_name: uploaded.name,
                })
            }
            state => {
                self.monitor.note_event(
                    "upload.await_active",
                    json!({
                        "state": format!("{state:?}"),
                        "name": uploaded.name,
                        "file": file.file_name,
                    }),
                );
                self.await_active(&uploaded.name).await?
            }
        };
        if remote.uri.is_empty() {
            return Err(AttachmentError::UnexpectedResponse {
                name: file.file_name.clone(),
                reason: "file.uri missing".into(),
            });
        }

        info!(file = %file.file_name, uri = %remote.uri, "remote file active");
        Ok(UploadedFileHandle::Remote {
            display_name: file.file_name.clone(),
            mime_type: remote.mime_type.unwrap_or_else(|| file.mime_type.clone()),
            file_uri: remote.uri,
            remote_name: remote.name,
        })
    }

    async fn start_session(&self, file: &FetchedFile) -> Result<String, AttachmentError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Goog-Upload-Protocol", HeaderValue::from_static("resumable"));
        headers.insert("X-Goog-Upload-Command", HeaderValue::from_static("start"));
        headers.insert(
            "X-Goog-Upload-Header-Content-Length",
            HeaderValue::from(file.size()),
        );
        if let Ok(mime) = HeaderValue::from_str(&file.mime_type) {
            headers.insert("X-Goog-Upload-Header-Content-Type", mime);
        }

        let resp = self
            .http
            .post(self.endpoint.upload_url())
            .query(&[("key", self.api_key.as_str())])
            .headers(headers)
            .json(&json!({"file": {"display_name": file.file_name}}))
            .send()
            .await?;
        let resp = ensure_success(resp, &file.file_name, "start").await?;

        let session = resp
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string());
        match session {
            Some(url) => {
                debug!(file = %file.file_name, "upload session opened");
                Ok(url)
            }
            None => Err(AttachmentError::MissingUploadUrl {
                name: file.file_name.clone(),
            }),
        }
    }

    async fn send_bytes(
        &self,
        file: &FetchedFile,
        session_url: &str,
    ) -> Result<RemoteFile, AttachmentError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Goog-Upload-Command",
            HeaderValue::from_static("upload, finalize"),
        );
        headers.insert("X-Goog-Upload-Offset", HeaderValue::from_static("0"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(file.size()));
        if let Ok(mime) = HeaderValue::from_str(&file.mime_type) {
            headers.insert(CONTENT_TYPE, mime);
        }

        let resp = self
            .http
            .post(session_url)
            .headers(headers)
            .body(file.data.clone())
            .send()
            .await?;
        let resp = ensure_success(resp, &file.file_name, "finalize").await?;
        let body = resp.text().await?;
        let parsed: UploadResponse =
            serde_json::from_str(&body).map_err(|err| AttachmentError::UnexpectedResponse {
                name: file.file_name.clone(),
                reason: err.to_string(),
            })?;
        Ok(parsed.file)
    }

    /// Poll `files.get` until the file leaves processing or the deadline passes.
    async fn await_active(&self, remote_name: &str) -> Result<RemoteFile, AttachmentError> {
        match tokio::time::timeout(self.limits.poll_timeout, self.poll_state(remote_name)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AttachmentError::ProcessingTimeout {
                remote_name: remote_name.to_string(),
                waited: self.limits.poll_timeout,
            }),
        }
    }

    async fn poll_state(&self, remote_name: &str) -> Result<RemoteFile, AttachmentError> {
        let mut polls: u32 = 0;
        loop {
            tokio::time::sleep(self.limits.poll_interval).await;
            polls += 1;
            let resp = self
                .http
                .get(self.endpoint.file_url(remote_name))
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await?;
            let resp = ensure_success(resp, remote_name, "get").await?;
            let body = resp.text().await?;
            let current: RemoteFile =
                serde_json::from_str(&body).map_err(|err| AttachmentError::UnexpectedResponse {
                    name: remote_name.to_string(),
                    reason: err.to_string(),
                })?;
            debug!(name = remote_name, state = ?current.state, polls, "polled file state");
            match current.state {
                FileState::Active => return Ok(current),
                FileState::Failed => {
                    return Err(AttachmentError::ProcessingFailed {
                        remote_name: remote_name.to_string(),
                    })
                }
                _ => {}
            }
        }
    }
}

async fn ensure_success(
    resp: Response,
    name: &str,
    stage: &'static str,
) -> Result<Response, AttachmentError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(AttachmentError::UploadStatus {
        name: name.to_string(),
        stage,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{ApiEndpoint, AttachmentLimits};
    use crate::telemetry::RunMonitor;

    fn uploader(server: &MockServer) -> FileUploader {
        let limits = AttachmentLimits {
            inline_threshold: 16,
            max_file_size: 1024,
            poll_interval: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(200),
            ..AttachmentLimits::default()
        };
        FileUploader::new(
            Client::new(),
            ApiEndpoint::new(server.uri(), "v1beta"),
            "test-key".into(),
            limits,
            RunMonitor::new(),
        )
    }

    fn video() -> FetchedFile {
        FetchedFile::new("clip.mp4", "video/mp4", Bytes::from(vec![1u8; 64]))
    }

    async fn mount_start(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(query_param("key", "test-key"))
            .and(header("X-Goog-Upload-Protocol", "resumable"))
            .and(header("X-Goog-Upload-Command", "start"))
            .and(header("X-Goog-Upload-Header-Content-Length", "64"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Goog-Upload-URL", format!("{}/session/1", server.uri())),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn active_upload_returns_remote_handle() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .and(header("X-Goog-Upload-Offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc",
                    "uri": "https://files.example/abc",
                    "mimeType": "video/mp4",
                    "state": "ACTIVE"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handle = uploader(&server).upload(&video()).await.unwrap();
        match handle {
            UploadedFileHandle::Remote {
                file_uri,
                remote_name,
                mime_type,
                ..
            } => {
                assert_eq!(file_uri, "https://files.example/abc");
                assert_eq!(remote_name, "files/abc");
                assert_eq!(mime_type, "video/mp4");
            }
            other => panic!("expected remote handle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_session_header_fails_the_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = uploader(&server).upload(&video()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::MissingUploadUrl { .. }));
    }

    #[tokio::test]
    async fn processing_file_is_polled_until_active() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/slow", "uri": "https://files.example/slow", "state": "PROCESSING"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/slow", "uri": "https://files.example/slow", "state": "PROCESSING"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/slow", "uri": "https://files.example/slow", "state": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let handle = uploader(&server).upload(&video()).await.unwrap();
        assert!(!handle.is_inline());
        // No mimeType in the poll response, so the fetched type is kept.
        assert_eq!(handle.mime_type(), "video/mp4");
    }

    #[tokio::test]
    async fn active_poll_without_uri_fails_the_file() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/x", "state": "PROCESSING"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/x", "state": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let err = uploader(&server).upload(&video()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn active_finalize_without_uri_fails_the_file() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/y", "state": "ACTIVE"}
            })))
            .mount(&server)
            .await;

        let err = uploader(&server).upload(&video()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn failed_state_is_terminal() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/bad", "state": "FAILED"}
            })))
            .mount(&server)
            .await;

        let err = uploader(&server).upload(&video()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::ProcessingFailed { .. }));
    }

    #[tokio::test]
    async fn stuck_processing_times_out() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {"name": "files/stuck", "state": "PROCESSING"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/stuck"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/stuck", "state": "PROCESSING"
            })))
            .mount(&server)
            .await;

        let err = uploader(&server).upload(&video()).await.unwrap_err();
        assert!(matches!(err, AttachmentError::ProcessingTimeout { .. }));
    }
}
