use reqwest::{Client, StatusCode};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{GenerateRequest, GenerateResponse, GenerationConfig, UsageMetadata};
use crate::config::ApiEndpoint;
use crate::constants::PROBE_MAX_OUTPUT_TOKENS;
use crate::error::GenerationError;
use crate::retry::RetryPolicy;
use crate::telemetry::{RequestEvent, RunMonitor};

/// `generateContent` caller with the sequential retry loop.
pub struct GeminiClient {
    http: Client,
    endpoint: ApiEndpoint,
    api_key: String,
    retry: RetryPolicy,
    monitor: RunMonitor,
}

struct Generated {
    text: String,
    usage: Option<UsageMetadata>,
}

impl GeminiClient {
    pub fn new(
        http: Client,
        endpoint: ApiEndpoint,
        api_key: String,
        retry: RetryPolicy,
        monitor: RunMonitor,
    ) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            retry,
            monitor,
        }
    }

    /// Send `request` until it succeeds or the attempt budget runs out.
    ///
    /// A 429 waits `rate_limit_delay(attempt)`; any other failure, including
    /// a 2xx without candidate text, waits the flat failure delay. Nothing is
    /// slept after the last attempt, whose error is returned as-is.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateRequest,
        action: &str,
    ) -> Result<String, GenerationError> {
        let max_attempts = self.retry.attempts();
        let started_at = OffsetDateTime::now_utc();
        let mut attempt: u32 = 1;
        loop {
            let err = match self.send_once(model, request, attempt).await {
                Ok(generated) => {
                    self.record(model, action, request, started_at, attempt, generated.usage);
                    return Ok(generated.text);
                }
                Err(err) => err,
            };
            if attempt >= max_attempts {
                warn!(model, attempt, error = %err, "generateContent gave up");
                return Err(err);
            }

            let delay = if err.is_rate_limited() {
                self.retry.rate_limit_delay(attempt)
            } else {
                self.retry.failure_delay()
            };
            warn!(
                model,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "generateContent attempt failed, retrying"
            );
            self.monitor.note_event(
                "retry.generateContent",
                json!({
                    "attempt": attempt,
                    "delay_ms": delay.as_millis() as u64,
                    "rate_limited": err.is_rate_limited(),
                    "model": model,
                }),
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        model: &str,
        request: &GenerateRequest,
        attempt: u32,
    ) -> Result<Generated, GenerationError> {
        let resp = self
            .http
            .post(self.endpoint.generate_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::RateLimited {
                attempts: attempt,
                body,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
        let text = parsed
            .first_text()
            .ok_or_else(|| {
                GenerationError::MalformedResponse("candidates[0].content.parts[0].text".into())
            })?
            .to_string();
        debug!(model, attempt, chars = text.len(), "generateContent succeeded");
        Ok(Generated {
            text,
            usage: parsed.usage_metadata,
        })
    }

    /// One request, no retries. A rate-limited key still counts as valid.
    pub async fn probe_key(&self, model: &str) -> Result<bool, GenerationError> {
        let request = GenerateRequest::new(
            "Hello",
            &[],
            GenerationConfig {
                temperature: 0.0,
                max_output_tokens: PROBE_MAX_OUTPUT_TOKENS,
                top_k: 1,
                top_p: 1.0,
            },
        );
        let resp = self
            .http
            .post(self.endpoint.generate_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        debug!(model, status = status.as_u16(), "probed API key");
        Ok(status.is_success() || status == StatusCode::TOO_MANY_REQUESTS)
    }

    fn record(
        &self,
        model: &str,
        action: &str,
        request: &GenerateRequest,
        started_at: OffsetDateTime,
        attempts: u32,
        usage: Option<UsageMetadata>,
    ) {
        let usage = usage.unwrap_or_default();
        self.monitor.record(RequestEvent {
            model: model.to_string(),
            action: action.to_string(),
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            attempts,
            file_parts: request.file_part_count(),
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const MODEL: &str = "gemini-1.5-flash";
    const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            error_delay: Duration::from_millis(20),
        }
    }

    fn client(server: &MockServer, monitor: RunMonitor) -> GeminiClient {
        GeminiClient::new(
            Client::new(),
            ApiEndpoint::new(server.uri(), "v1beta"),
            "test-key".into(),
            policy(),
            monitor,
        )
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new(
            "Write a reply",
            &[],
            GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 100,
                top_k: 40,
                top_p: 0.75,
            },
        )
    }

    fn success(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }))
    }

    #[tokio::test]
    async fn recovers_after_two_rate_limits_with_growing_waits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(query_param("key", "test-key"))
            .respond_with(success("Sounds good."))
            .mount(&server)
            .await;

        let monitor = RunMonitor::new();
        let started = Instant::now();
        let text = client(&server, monitor.clone())
            .generate_content(MODEL, &request(), "reply")
            .await
            .unwrap();
        assert_eq!(text, "Sounds good.");
        // 50ms after attempt 1, 100ms after attempt 2.
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);

        let events = monitor.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attempts, 3);
        assert_eq!(events[0].total_tokens, Some(16));
        let retries: Vec<_> = monitor
            .notes()
            .into_iter()
            .map(|note| note.payload["delay_ms"].as_u64().unwrap())
            .collect();
        assert_eq!(retries, vec![50, 100]);
    }

    #[tokio::test]
    async fn surfaces_last_error_after_exhausting_attempts() {
        let server = MockServer::start().await;
        for body in ["first", "second"] {
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(500).set_body_string(body))
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("third"))
            .mount(&server)
            .await;

        let err = client(&server, RunMonitor::new())
            .generate_content(MODEL, &request(), "reply")
            .await
            .unwrap_err();
        match err {
            GenerationError::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "third");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_success_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(success("  second try  "))
            .mount(&server)
            .await;

        let text = client(&server, RunMonitor::new())
            .generate_content(MODEL, &request(), "reply")
            .await
            .unwrap();
        assert_eq!(text, "  second try  ");
    }

    #[tokio::test]
    async fn persistent_malformed_response_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, RunMonitor::new())
            .generate_content(MODEL, &request(), "summarize")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn single_attempt_budget_never_sleeps() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .expect(1)
            .mount(&server)
            .await;

        let mut gemini = client(&server, RunMonitor::new());
        gemini.retry = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_secs(30),
            ..policy()
        };
        let started = Instant::now();
        let err = gemini
            .generate_content(MODEL, &request(), "reply")
            .await
            .unwrap_err();
        match &err {
            GenerationError::RateLimited { attempts, body } => {
                assert_eq!(*attempts, 1);
                assert_eq!(body, "quota exhausted");
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn probe_treats_rate_limit_as_valid_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        assert!(client(&server, RunMonitor::new()).probe_key(MODEL).await.unwrap());

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        assert!(!client(&server, RunMonitor::new()).probe_key(MODEL).await.unwrap());
    }
}
