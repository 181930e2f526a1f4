//! Wire types for the `generateContent` endpoint.

pub mod gemini;

use serde::{Deserialize, Serialize};

use crate::core::UploadedFileHandle;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    /// Text first, then one part per file in the given order.
    pub fn new(
        instruction: impl Into<String>,
        files: &[UploadedFileHandle],
        generation_config: GenerationConfig,
    ) -> Self {
        let mut parts = Vec::with_capacity(files.len() + 1);
        parts.push(Part::text(instruction));
        parts.extend(files.iter().map(Part::from));
        Self {
            contents: vec![Content { parts }],
            generation_config,
        }
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.contents.iter().flat_map(|content| content.parts.iter())
    }

    pub fn file_part_count(&self) -> usize {
        self.parts().filter(|part| !part.is_text()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileRef,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Part::Text { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl From<&UploadedFileHandle> for Part {
    fn from(handle: &UploadedFileHandle) -> Self {
        match handle {
            UploadedFileHandle::Inline {
                mime_type,
                base64_data,
                ..
            } => Part::InlineData {
                inline_data: Blob {
                    mime_type: mime_type.clone(),
                    data: base64_data.clone(),
                },
            },
            UploadedFileHandle::Remote {
                mime_type, file_uri, ..
            } => Part::FileData {
                file_data: FileRef {
                    mime_type: mime_type.clone(),
                    file_uri: file_uri.clone(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

impl GenerateResponse {
    /// `candidates[0].content.parts[0].text`, if present.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .get("text")?
            .as_str()
    }
}
