use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::ORIGINAL_EMAIL_MAX_CHARS;
use crate::providers::GenerationConfig;
use crate::utils::clean_email_text;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Formal,
    Casual,
    Brief,
    Detailed,
    Friendly,
    Professional,
}

impl Tone {
    pub const ALL: [Tone; 6] = [
        Tone::Formal,
        Tone::Casual,
        Tone::Brief,
        Tone::Detailed,
        Tone::Friendly,
        Tone::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Casual => "casual",
            Tone::Brief => "brief",
            Tone::Detailed => "detailed",
            Tone::Friendly => "friendly",
            Tone::Professional => "professional",
        }
    }

    /// How the tone is described to the model.
    pub fn description(&self) -> &'static str {
        match self {
            Tone::Formal => "professional and respectful",
            Tone::Casual => "friendly and conversational",
            Tone::Brief => "concise and direct",
            Tone::Detailed => "comprehensive but focused",
            Tone::Friendly => "warm and personable",
            Tone::Professional => "business-appropriate and competent",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Tone::ALL
            .iter()
            .copied()
            .find(|tone| tone.as_str() == wanted)
            .ok_or_else(|| {
                let known = Tone::ALL.map(|t| t.as_str()).join(", ");
                format!("unknown tone '{s}' (expected one of: {known})")
            })
    }
}

/// Which detector produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    DownloadLink,
    AttachmentElement,
    InlineImage,
}

/// Where a candidate's bytes can be obtained from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AccessHandle {
    Url(String),
    DataUrl(String),
    /// Only the element itself is known; bytes can only come from the download fallback.
    Missing,
}

impl AccessHandle {
    /// Classify a raw `href`/`src`, resolving relative references against `base`.
    pub fn from_reference(raw: &str, base: Option<&Url>) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return AccessHandle::Missing;
        }
        if raw
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        {
            return AccessHandle::DataUrl(raw.to_string());
        }
        if let Ok(url) = Url::parse(raw) {
            return AccessHandle::Url(url.to_string());
        }
        match base.and_then(|base| base.join(raw).ok()) {
            Some(url) => AccessHandle::Url(url.to_string()),
            None => AccessHandle::Url(raw.to_string()),
        }
    }
}

/// Non-owning pointer back to the element a candidate came from.
///
/// Stores the selector and match ordinal so the element can be looked up
/// again in the same document. Resolution fails quietly once the document
/// has changed shape.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub nth: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, nth: usize) -> Self {
        Self {
            selector: selector.into(),
            nth,
        }
    }

    pub fn resolve<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        let selector = Selector::parse(&self.selector).ok()?;
        document.select(&selector).nth(self.nth)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub file_name: String,
    pub method: DiscoveryMethod,
    pub handle: AccessHandle,
    pub element: Option<ElementHandle>,
}

/// Bytes of one attachment, already checked against the size ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl FetchedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A file that can be referenced from a generation request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadedFileHandle {
    Inline {
        display_name: String,
        mime_type: String,
        base64_data: String,
    },
    /// Only produced once the remote file reports ACTIVE.
    Remote {
        display_name: String,
        mime_type: String,
        file_uri: String,
        remote_name: String,
    },
}

impl UploadedFileHandle {
    pub fn display_name(&self) -> &str {
        match self {
            UploadedFileHandle::Inline { display_name, .. }
            | UploadedFileHandle::Remote { display_name, .. } => display_name,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            UploadedFileHandle::Inline { mime_type, .. }
            | UploadedFileHandle::Remote { mime_type, .. } => mime_type,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, UploadedFileHandle::Inline { .. })
    }
}

/// Everything known about the message being answered. Built once per action.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EmailContext {
    subject: String,
    sender_name: String,
    sender_email: String,
    recipient: String,
    original_email: String,
    is_reply: bool,
    is_forward: bool,
    attachments: String,
    attachment_files: Vec<AttachmentDescriptor>,
}

impl EmailContext {
    pub fn builder() -> EmailContextBuilder {
        EmailContextBuilder::default()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn original_email(&self) -> &str {
        &self.original_email
    }

    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    pub fn is_forward(&self) -> bool {
        self.is_forward
    }

    /// Comma-joined names of every detected attachment.
    pub fn attachments(&self) -> &str {
        &self.attachments
    }

    pub fn attachment_files(&self) -> &[AttachmentDescriptor] {
        &self.attachment_files
    }
}

#[derive(Debug, Default)]
pub struct EmailContextBuilder {
    subject: String,
    sender_name: String,
    sender_email: String,
    recipient: String,
    original_email: String,
    is_reply: Option<bool>,
    is_forward: Option<bool>,
    attachment_files: Vec<AttachmentDescriptor>,
}

impl EmailContextBuilder {
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self.sender_email = email.into();
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn original_email(mut self, text: &str) -> Self {
        self.original_email = clean_email_text(text, ORIGINAL_EMAIL_MAX_CHARS);
        self
    }

    pub fn reply(mut self, is_reply: bool) -> Self {
        self.is_reply = Some(is_reply);
        self
    }

    pub fn forward(mut self, is_forward: bool) -> Self {
        self.is_forward = Some(is_forward);
        self
    }

    pub fn attachment_files(mut self, files: Vec<AttachmentDescriptor>) -> Self {
        self.attachment_files = files;
        self
    }

    pub fn build(self) -> EmailContext {
        let subject = self.subject.trim().to_string();
        let lowered = subject.to_lowercase();
        let is_reply = self.is_reply.unwrap_or_else(|| lowered.starts_with("re:"));
        let is_forward = self
            .is_forward
            .unwrap_or_else(|| lowered.starts_with("fwd:") || lowered.starts_with("fw:"));
        let attachments = self
            .attachment_files
            .iter()
            .map(|file| file.file_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        EmailContext {
            subject,
            sender_name: self.sender_name.trim().to_string(),
            sender_email: self.sender_email.trim().to_string(),
            recipient: self.recipient.trim().to_string(),
            original_email: self.original_email,
            is_reply,
            is_forward,
            attachments,
            attachment_files: self.attachment_files,
        }
    }
}

/// One way of spotting file-bearing elements in a page.
pub trait AttachmentDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must return an empty list, never fail, on pages without this detector's markers.
    fn detect(&self, document: &Html, base: Option<&Url>) -> Vec<AttachmentDescriptor>;
}

/// Last-resort retrieval for candidates that cannot be fetched directly.
#[async_trait]
pub trait DownloadInterceptor: Send + Sync {
    async fn intercept(&self, descriptor: &AttachmentDescriptor) -> Option<FetchedFile>;
}

/// Turns an email context into instruction text plus sampling parameters.
pub trait PromptStrategy: Send + Sync {
    fn instruction(&self, context: &EmailContext, files: &[UploadedFileHandle]) -> String;
    fn generation_config(&self) -> GenerationConfig;
}
