use reqwest::Client;
use tracing::{debug, info};

use crate::attachments::AttachmentFetcher;
use crate::config::{Action, AppConfig, Settings};
use crate::constants::REQUEST_TIMEOUT;
use crate::core::{EmailContext, PromptStrategy, Tone, UploadedFileHandle};
use crate::error::GenerationError;
use crate::prompts::{format_summary, ReplyPrompt, SummaryPrompt, TranslatePrompt};
use crate::providers::gemini::GeminiClient;
use crate::providers::GenerateRequest;
use crate::telemetry::RunMonitor;
use crate::upload::{FileUploader, UploadOrchestrator};

/// Per-call reply parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyOptions {
    pub model: String,
    pub tone: Tone,
    pub max_tokens: u32,
    pub temperature: f32,
    pub analyze_attachments: bool,
    pub multimodal_analysis: bool,
}

impl ReplyOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            tone: settings.tone,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            analyze_attachments: settings.analyze_attachments,
            multimodal_analysis: settings.multimodal_analysis,
        }
    }
}

/// Both halves exist only when an API key was configured.
struct Backend {
    gemini: GeminiClient,
    uploads: UploadOrchestrator,
}

pub struct GenerationService {
    backend: Option<Backend>,
}

impl GenerationService {
    pub fn new(config: &AppConfig, monitor: RunMonitor) -> Result<Self, GenerationError> {
        let Some(api_key) = config.api_key.clone() else {
            debug!("no API key configured");
            return Ok(Self { backend: None });
        };
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let fetch_http = Client::builder()
            .timeout(config.limits.fetch_timeout)
            .build()?;

        let uploads = UploadOrchestrator::new(
            AttachmentFetcher::new(fetch_http, &config.limits),
            FileUploader::new(
                http.clone(),
                config.api.clone(),
                api_key.clone(),
                config.limits.clone(),
                monitor.clone(),
            ),
            config.limits.max_files,
            monitor.clone(),
        );
        let gemini = GeminiClient::new(
            http,
            config.api.clone(),
            api_key,
            config.retry.clone(),
            monitor,
        );
        Ok(Self {
            backend: Some(Backend { gemini, uploads }),
        })
    }

    fn backend(&self) -> Result<&Backend, GenerationError> {
        self.backend.as_ref().ok_or(GenerationError::MissingApiKey)
    }

    /// Assemble the request; with `multimodal` set this fetches and uploads attachments first.
    pub(crate) async fn build_request(
        &self,
        ctx: &EmailContext,
        strategy: &dyn PromptStrategy,
        multimodal: bool,
    ) -> Result<GenerateRequest, GenerationError> {
        let backend = self.backend()?;
        let files: Vec<UploadedFileHandle> = if multimodal {
            backend.uploads.upload_all(ctx).await
        } else {
            Vec::new()
        };
        Ok(GenerateRequest::new(
            strategy.instruction(ctx, &files),
            &files,
            strategy.generation_config(),
        ))
    }

    async fn execute(
        &self,
        action: Action,
        model: &str,
        ctx: &EmailContext,
        strategy: &dyn PromptStrategy,
        multimodal: bool,
    ) -> Result<String, GenerationError> {
        let request = self.build_request(ctx, strategy, multimodal).await?;
        info!(
            action = action.as_str(),
            model,
            file_parts = request.file_part_count(),
            "generating"
        );
        self.backend()?
            .gemini
            .generate_content(model, &request, action.as_str())
            .await
    }

    pub async fn generate_reply(
        &self,
        ctx: &EmailContext,
        options: &ReplyOptions,
    ) -> Result<String, GenerationError> {
        let strategy = ReplyPrompt {
            tone: options.tone,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            analyze_attachments: options.analyze_attachments,
        };
        let text = self
            .execute(
                Action::Reply,
                &options.model,
                ctx,
                &strategy,
                options.multimodal_analysis,
            )
            .await?;
        Ok(text.trim().to_string())
    }

    /// Summary text with light HTML markup.
    pub async fn generate_summary(
        &self,
        ctx: &EmailContext,
        model: &str,
        multimodal: bool,
    ) -> Result<String, GenerationError> {
        let text = self
            .execute(Action::Summarize, model, ctx, &SummaryPrompt, multimodal)
            .await?;
        Ok(format_summary(text.trim()))
    }

    pub async fn translate(
        &self,
        ctx: &EmailContext,
        model: &str,
        language: &str,
        multimodal: bool,
    ) -> Result<String, GenerationError> {
        let strategy = TranslatePrompt {
            language: language.to_string(),
        };
        let text = self
            .execute(Action::Translate, model, ctx, &strategy, multimodal)
            .await?;
        Ok(text.trim().to_string())
    }

    pub async fn run_action(
        &self,
        action: Action,
        ctx: &EmailContext,
        settings: &Settings,
    ) -> Result<String, GenerationError> {
        match action {
            Action::Reply => {
                self.generate_reply(ctx, &ReplyOptions::from_settings(settings))
                    .await
            }
            Action::Summarize => {
                self.generate_summary(ctx, &settings.model, settings.multimodal_analysis)
                    .await
            }
            Action::Translate => {
                self.translate(
                    ctx,
                    &settings.model,
                    &settings.translate_language,
                    settings.multimodal_analysis,
                )
                .await
            }
        }
    }

    pub async fn check_api_key(&self, model: &str) -> Result<bool, GenerationError> {
        self.backend()?.gemini.probe_key(model).await
    }
}
