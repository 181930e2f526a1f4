use anyhow::{anyhow, Context};
use bytesize::ByteSize;
use serde::Deserialize;
use std::{
    env,
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::constants::{
    API_KEY_ENV, DEFAULT_API_BASE, DEFAULT_API_VERSION, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, DEFAULT_TRANSLATE_LANGUAGE, DOWNLOAD_FALLBACK_WAIT, FETCH_TIMEOUT,
    FILE_POLL_INTERVAL, FILE_POLL_TIMEOUT, INLINE_THRESHOLD_BYTES, MAX_FILE_BYTES,
    MAX_UPLOAD_FILES,
};
use crate::core::Tone;
use crate::retry::RetryPolicy;

const CONFIG_FILE_NAMES: [&str; 2] = ["replysmith.yaml", "replysmith.yml"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Defaults {
    pub model: Option<String>,
    pub tone: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub translate_language: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AttachmentsCfg {
    pub analyze: Option<bool>,
    pub multimodal: Option<bool>,
    pub max_files: Option<usize>,
    pub inline_threshold: Option<String>,
    pub max_file_size: Option<String>,
    pub poll_interval: Option<String>,
    pub poll_timeout: Option<String>,
    pub download_wait: Option<String>,
    pub fetch_timeout: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetryCfg {
    pub max_attempts: Option<u32>,
    pub base_delay: Option<String>,
    pub max_delay: Option<String>,
    pub error_delay: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiCfg {
    pub base_url: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Root {
    pub api_key: Option<String>,
    pub defaults: Option<Defaults>,
    pub attachments: Option<AttachmentsCfg>,
    pub retry: Option<RetryCfg>,
    pub api: Option<ApiCfg>,
}

/// The single action a bare `run` performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    Reply,
    Summarize,
    Translate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Reply => "reply",
            Action::Summarize => "summarize",
            Action::Translate => "translate",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reply" | "generate" => Ok(Action::Reply),
            "summary" | "summarize" => Ok(Action::Summarize),
            "translate" | "translation" => Ok(Action::Translate),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// User preferences that shape a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub tone: Tone,
    pub max_tokens: u32,
    pub temperature: f32,
    pub analyze_attachments: bool,
    pub multimodal_analysis: bool,
    pub translate_language: String,
    pub action: Action,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            tone: Tone::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            analyze_attachments: false,
            multimodal_analysis: false,
            translate_language: DEFAULT_TRANSLATE_LANGUAGE.to_string(),
            action: Action::default(),
        }
    }
}

/// Size and timing policy for the attachment pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_files: usize,
    pub inline_threshold: u64,
    pub max_file_size: u64,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub download_wait: Duration,
    pub fetch_timeout: Duration,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_files: MAX_UPLOAD_FILES,
            inline_threshold: INLINE_THRESHOLD_BYTES,
            max_file_size: MAX_FILE_BYTES,
            poll_interval: FILE_POLL_INTERVAL,
            poll_timeout: FILE_POLL_TIMEOUT,
            download_wait: DOWNLOAD_FALLBACK_WAIT,
            fetch_timeout: FETCH_TIMEOUT,
        }
    }
}

/// Location of the generative-language API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub version: String,
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_API_VERSION)
    }
}

impl ApiEndpoint {
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.into().trim_matches('/').to_string(),
        }
    }

    pub fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, self.version, model
        )
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload/{}/files", self.base_url, self.version)
    }

    /// `name` is the resource name returned by the upload, e.g. `files/abc123`.
    pub fn file_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.version,
            name.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub settings: Settings,
    pub limits: AttachmentLimits,
    pub retry: RetryPolicy,
    pub api: ApiEndpoint,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_root(Some(Self::read_yaml(p)?), Some(p.to_path_buf())),
            None => match Self::discover() {
                Some(found) => Self::from_root(Some(Self::read_yaml(&found)?), Some(found)),
                None => Self::from_root(None, None),
            },
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = CONFIG_FILE_NAMES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists());
        local.or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join("replysmith").join("config.yaml"))
                .filter(|candidate| candidate.exists())
        })
    }

    fn read_yaml(path: &Path) -> anyhow::Result<Root> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        serde_yaml::from_reader(file).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_root(root: Option<Root>, source: Option<PathBuf>) -> anyhow::Result<Self> {
        let r = root.unwrap_or_default();
        let defaults = r.defaults.unwrap_or_default();
        let attachments = r.attachments.unwrap_or_default();
        let retry = r.retry.unwrap_or_default();
        let api = r.api.unwrap_or_default();

        let api_key = env::var(API_KEY_ENV)
            .ok()
            .or(r.api_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let model = env::var("REPLYSMITH_MODEL")
            .ok()
            .or(defaults.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let tone = match env::var("REPLYSMITH_TONE").ok().or(defaults.tone) {
            Some(raw) => raw.parse::<Tone>().map_err(|e| anyhow!(e))?,
            None => Tone::default(),
        };
        let action = match defaults.action {
            Some(raw) => raw.parse::<Action>().map_err(|e| anyhow!(e))?,
            None => Action::default(),
        };

        let settings = Settings {
            model,
            tone,
            max_tokens: defaults.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: defaults.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            analyze_attachments: attachments.analyze.unwrap_or(false),
            multimodal_analysis: attachments.multimodal.unwrap_or(false),
            translate_language: defaults
                .translate_language
                .unwrap_or_else(|| DEFAULT_TRANSLATE_LANGUAGE.to_string()),
            action,
        };

        let fallback = AttachmentLimits::default();
        let limits = AttachmentLimits {
            max_files: attachments.max_files.unwrap_or(fallback.max_files),
            inline_threshold: parse_size(attachments.inline_threshold, fallback.inline_threshold)?,
            max_file_size: parse_size(attachments.max_file_size, fallback.max_file_size)?,
            poll_interval: parse_duration(attachments.poll_interval, fallback.poll_interval)?,
            poll_timeout: parse_duration(attachments.poll_timeout, fallback.poll_timeout)?,
            download_wait: parse_duration(attachments.download_wait, fallback.download_wait)?,
            fetch_timeout: parse_duration(attachments.fetch_timeout, fallback.fetch_timeout)?,
        };
        if limits.inline_threshold > limits.max_file_size {
            return Err(anyhow!(
                "attachments.inline_threshold ({}) exceeds attachments.max_file_size ({})",
                ByteSize::b(limits.inline_threshold),
                ByteSize::b(limits.max_file_size)
            ));
        }
        if limits.max_files > MAX_UPLOAD_FILES {
            return Err(anyhow!(
                "attachments.max_files ({}) exceeds the API limit of {MAX_UPLOAD_FILES} files",
                limits.max_files
            ));
        }
        if limits.poll_interval.is_zero() {
            return Err(anyhow!("attachments.poll_interval must be greater than zero"));
        }

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(default_retry.max_attempts),
            base_delay: parse_duration(retry.base_delay, default_retry.base_delay)?,
            max_delay: parse_duration(retry.max_delay, default_retry.max_delay)?,
            error_delay: parse_duration(retry.error_delay, default_retry.error_delay)?,
        };

        let api = ApiEndpoint::new(
            api.base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api.version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        );

        Ok(Self {
            api_key,
            settings,
            limits,
            retry,
            api,
            source,
        })
    }
}

fn parse_size(raw: Option<String>, fallback: u64) -> anyhow::Result<u64> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<ByteSize>()
            .map(|size| size.as_u64())
            .map_err(|e| anyhow!("invalid size '{value}': {e}")),
        None => Ok(fallback),
    }
}

fn parse_duration(raw: Option<String>, fallback: Duration) -> anyhow::Result<Duration> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim())
            .with_context(|| format!("invalid duration '{value}'")),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_pipeline_constants() {
        let cfg = AppConfig::from_root(None, None).unwrap();
        assert_eq!(cfg.limits.inline_threshold, 4 * 1024 * 1024);
        assert_eq!(cfg.limits.max_file_size, 20 * 1024 * 1024);
        assert_eq!(cfg.limits.max_files, 10);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.api.base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn reads_yaml_with_human_units() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
defaults:
  model: gemini-2.5-flash
  tone: brief
  max_tokens: 120
  action: summarize
attachments:
  multimodal: true
  inline_threshold: 2 MiB
  max_file_size: 8 MiB
  poll_interval: 500ms
  poll_timeout: 10s
retry:
  max_attempts: 5
  base_delay: 250ms
api:
  base_url: http://localhost:9999/
"#
        )
        .unwrap();

        let cfg = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.settings.tone, Tone::Brief);
        assert_eq!(cfg.settings.max_tokens, 120);
        assert_eq!(cfg.settings.action, Action::Summarize);
        assert!(cfg.settings.multimodal_analysis);
        assert_eq!(cfg.limits.inline_threshold, 2 * 1024 * 1024);
        assert_eq!(cfg.limits.max_file_size, 8 * 1024 * 1024);
        assert_eq!(cfg.limits.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.limits.poll_timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(250));
        assert_eq!(cfg.api.base_url, "http://localhost:9999");
        assert_eq!(cfg.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn rejects_inline_threshold_above_ceiling() {
        let root = Root {
            attachments: Some(AttachmentsCfg {
                inline_threshold: Some("30 MiB".into()),
                ..AttachmentsCfg::default()
            }),
            ..Root::default()
        };
        assert!(AppConfig::from_root(Some(root), None).is_err());
    }

    #[test]
    fn rejects_max_files_above_api_limit() {
        let at_limit = Root {
            attachments: Some(AttachmentsCfg {
                max_files: Some(10),
                ..AttachmentsCfg::default()
            }),
            ..Root::default()
        };
        assert_eq!(
            AppConfig::from_root(Some(at_limit), None).unwrap().limits.max_files,
            10
        );

        let over = Root {
            attachments: Some(AttachmentsCfg {
                max_files: Some(25),
                ..AttachmentsCfg::default()
            }),
            ..Root::default()
        };
        assert!(AppConfig::from_root(Some(over), None).is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let root = Root {
            attachments: Some(AttachmentsCfg {
                poll_interval: Some("0s".into()),
                ..AttachmentsCfg::default()
            }),
            ..Root::default()
        };
        assert!(AppConfig::from_root(Some(root), None).is_err());
    }

    #[test]
    fn rejects_bad_duration() {
        let root = Root {
            retry: Some(RetryCfg {
                base_delay: Some("soon".into()),
                ..RetryCfg::default()
            }),
            ..Root::default()
        };
        assert!(AppConfig::from_root(Some(root), None).is_err());
    }

    #[test]
    fn endpoint_urls() {
        let api = ApiEndpoint::new("http://127.0.0.1:8080/", "v1beta");
        assert_eq!(
            api.generate_url("gemini-1.5-flash"),
            "http://127.0.0.1:8080/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(api.upload_url(), "http://127.0.0.1:8080/upload/v1beta/files");
        assert_eq!(api.file_url("files/abc"), "http://127.0.0.1:8080/v1beta/files/abc");
    }
}
