//! Shared constants for the replysmith pipeline.

use std::time::Duration;

pub const GEMINI_1_5_FLASH: &str = "gemini-1.5-flash";
pub const GEMINI_1_5_PRO: &str = "gemini-1.5-pro";
pub const GEMINI_2_FLASH: &str = "gemini-2.0-flash";
pub const GEMINI_2_5_FLASH: &str = "gemini-2.5-flash";
pub const GEMINI_2_5_FLASH_LITE: &str = "gemini-2.5-flash-lite";

pub const AVAILABLE_MODELS: &[&str] = &[
    GEMINI_1_5_FLASH,
    GEMINI_1_5_PRO,
    GEMINI_2_FLASH,
    GEMINI_2_5_FLASH,
    GEMINI_2_5_FLASH_LITE,
];

pub const DEFAULT_MODEL: &str = GEMINI_1_5_FLASH;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v1beta";

pub const DEFAULT_MAX_TOKENS: u32 = 300;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TRANSLATE_LANGUAGE: &str = "English";

pub const REPLY_OUTPUT_TOKEN_CAP: u32 = 1024;
pub const REPLY_TOP_K: u32 = 40;
pub const REPLY_TOP_P: f32 = 0.95;

pub const SUMMARY_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_MAX_OUTPUT_TOKENS: u32 = 512;
pub const SUMMARY_TOP_K: u32 = 20;
pub const SUMMARY_TOP_P: f32 = 0.8;

pub const TRANSLATE_TEMPERATURE: f32 = 0.2;
pub const TRANSLATE_MAX_OUTPUT_TOKENS: u32 = 1024;
pub const TRANSLATE_TOP_K: u32 = 40;
pub const TRANSLATE_TOP_P: f32 = 0.9;

pub const PROBE_MAX_OUTPUT_TOKENS: u32 = 10;

/// Quoted thread text is cut to this many characters before prompting.
pub const ORIGINAL_EMAIL_MAX_CHARS: usize = 2000;

/// Gemini accepts at most this many file parts per request.
pub const MAX_UPLOAD_FILES: usize = 10;
pub const INLINE_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;
pub const MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;

pub const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const FILE_POLL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_FALLBACK_WAIT: Duration = Duration::from_secs(3);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_BASE: Duration = Duration::from_millis(1000);
pub const BACKOFF_CAP: Duration = Duration::from_millis(10_000);
pub const ERROR_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Images whose declared width or height is below this are treated as icons.
pub const MIN_INLINE_IMAGE_PX: u32 = 32;
