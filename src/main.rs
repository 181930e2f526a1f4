mod cli;

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use replysmith::attachments::AttachmentLocator;
use replysmith::config::{Action, AppConfig, Settings};
use replysmith::constants::AVAILABLE_MODELS;
use replysmith::core::{EmailContext, Tone};
use replysmith::service::GenerationService;
use replysmith::telemetry::RunMonitor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use cli::{Command, ContextArgs, GenerationArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(source) = &cfg.source {
        info!(config = %source.display(), "loaded config");
    }

    let monitor = RunMonitor::new();
    let outcome = dispatch(cli.cmd, &cfg, &monitor).await;
    if let Some(path) = &cli.telemetry {
        monitor
            .flush_summary(path)
            .with_context(|| format!("writing telemetry to {}", path.display()))?;
    }
    outcome
}

async fn dispatch(cmd: Command, cfg: &AppConfig, monitor: &RunMonitor) -> anyhow::Result<()> {
    match cmd {
        Command::Reply {
            context,
            generation,
        } => generate(Action::Reply, &context, &generation, cfg, monitor).await,
        Command::Summarize {
            context,
            generation,
        } => generate(Action::Summarize, &context, &generation, cfg, monitor).await,
        Command::Translate {
            context,
            generation,
        } => generate(Action::Translate, &context, &generation, cfg, monitor).await,
        Command::Run {
            action,
            context,
            generation,
        } => {
            let action = match action {
                Some(raw) => raw.parse::<Action>().map_err(|e| anyhow!(e))?,
                None => cfg.settings.action,
            };
            generate(action, &context, &generation, cfg, monitor).await
        }
        Command::Scan { page, base_url } => {
            let base = parse_base(base_url.as_deref())?;
            let html = fs::read_to_string(&page)
                .with_context(|| format!("reading {}", page.display()))?;
            for candidate in AttachmentLocator::new().scan(&html, base.as_ref()) {
                println!("{}", serde_json::to_string(&candidate)?);
            }
            Ok(())
        }
        Command::CheckKey { model } => {
            let model = model.unwrap_or_else(|| cfg.settings.model.clone());
            let service = GenerationService::new(cfg, monitor.clone())?;
            if service.check_api_key(&model).await? {
                println!("API key accepted ({model})");
                Ok(())
            } else {
                bail!("API key rejected by {model}")
            }
        }
    }
}

async fn generate(
    action: Action,
    context: &ContextArgs,
    generation: &GenerationArgs,
    cfg: &AppConfig,
    monitor: &RunMonitor,
) -> anyhow::Result<()> {
    let settings = merge_settings(&cfg.settings, generation)?;
    if !AVAILABLE_MODELS.contains(&settings.model.as_str()) {
        warn!(model = %settings.model, "model is not in the known list, sending anyway");
    }
    let ctx = build_context(context)?;
    let service = GenerationService::new(cfg, monitor.clone())?;
    let text = service
        .run_action(action, &ctx, &settings)
        .await
        .with_context(|| format!("{} failed, please try again", action.as_str()))?;
    println!("{text}");
    Ok(())
}

fn merge_settings(base: &Settings, args: &GenerationArgs) -> anyhow::Result<Settings> {
    let mut settings = base.clone();
    if let Some(model) = &args.model {
        settings.model = model.clone();
    }
    if let Some(raw) = &args.tone {
        settings.tone = raw.parse::<Tone>().map_err(|e| anyhow!(e))?;
    }
    if let Some(max_tokens) = args.max_tokens {
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = args.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            bail!("--temperature must be between 0 and 2, got {temperature}");
        }
        settings.temperature = temperature;
    }
    if let Some(language) = &args.language {
        settings.translate_language = language.clone();
    }
    settings.analyze_attachments |= args.analyze_attachments;
    settings.multimodal_analysis |= args.multimodal;
    Ok(settings)
}

fn build_context(args: &ContextArgs) -> anyhow::Result<EmailContext> {
    let original = match (&args.original, &args.original_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => read_original(path)?,
        (None, None) => String::new(),
    };
    let attachments = match &args.page {
        Some(page) => {
            let base = parse_base(args.base_url.as_deref())?;
            let html = fs::read_to_string(page)
                .with_context(|| format!("reading {}", page.display()))?;
            let found = AttachmentLocator::new().scan(&html, base.as_ref());
            info!(page = %page.display(), candidates = found.len(), "scanned page for attachments");
            found
        }
        None => Vec::new(),
    };
    Ok(EmailContext::builder()
        .subject(args.subject.as_str())
        .sender(args.from_name.as_str(), args.from_email.as_str())
        .recipient(args.to.as_str())
        .original_email(&original)
        .attachment_files(attachments)
        .build())
}

fn read_original(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading message from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_base(raw: Option<&str>) -> anyhow::Result<Option<Url>> {
    raw.map(|value| Url::parse(value).with_context(|| format!("invalid --base-url '{value}'")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_settings() {
        let base = Settings::default();
        let args = GenerationArgs {
            model: Some("gemini-2.5-flash".into()),
            tone: Some("Friendly".into()),
            max_tokens: Some(120),
            multimodal: true,
            ..GenerationArgs::default()
        };
        let merged = merge_settings(&base, &args).unwrap();
        assert_eq!(merged.model, "gemini-2.5-flash");
        assert_eq!(merged.tone, Tone::Friendly);
        assert_eq!(merged.max_tokens, 120);
        assert!(merged.multimodal_analysis);
        assert_eq!(merged.temperature, base.temperature);
    }

    #[test]
    fn rejects_unknown_tone_and_wild_temperature() {
        let base = Settings::default();
        let bad_tone = GenerationArgs {
            tone: Some("sarcastic".into()),
            ..GenerationArgs::default()
        };
        assert!(merge_settings(&base, &bad_tone).is_err());
        let hot = GenerationArgs {
            temperature: Some(3.5),
            ..GenerationArgs::default()
        };
        assert!(merge_settings(&base, &hot).is_err());
    }

    #[test]
    fn context_reads_page_and_message_file() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("mail.html");
        fs::write(
            &page,
            r#"<a download="agenda.pdf" href="/att/agenda.pdf">agenda.pdf</a>"#,
        )
        .unwrap();
        let body = dir.path().join("mail.txt");
        fs::write(&body, "Agenda attached.\n\nOn Mon, Bob wrote:\n> old").unwrap();

        let ctx = build_context(&ContextArgs {
            subject: "Fwd: Agenda".into(),
            original_file: Some(body),
            page: Some(page),
            base_url: Some("https://mail.example.com/u/0/".into()),
            ..ContextArgs::default()
        })
        .unwrap();
        assert!(ctx.is_forward());
        assert_eq!(ctx.attachments(), "agenda.pdf");
        assert!(ctx.original_email().starts_with("Agenda attached."));
        assert!(!ctx.original_email().contains("wrote:"));
    }
}
