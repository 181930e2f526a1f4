use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants::{
    REPLY_OUTPUT_TOKEN_CAP, REPLY_TOP_K, REPLY_TOP_P, SUMMARY_MAX_OUTPUT_TOKENS,
    SUMMARY_TEMPERATURE, SUMMARY_TOP_K, SUMMARY_TOP_P, TRANSLATE_MAX_OUTPUT_TOKENS,
    TRANSLATE_TEMPERATURE, TRANSLATE_TOP_K, TRANSLATE_TOP_P,
};
use crate::core::{EmailContext, PromptStrategy, Tone, UploadedFileHandle};
use crate::providers::GenerationConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPrompt {
    pub tone: Tone,
    pub max_tokens: u32,
    pub temperature: f32,
    pub analyze_attachments: bool,
}

impl ReplyPrompt {
    /// Roughly three words per four tokens.
    pub fn word_limit(&self) -> u32 {
        (f64::from(self.max_tokens) * 0.75).floor() as u32
    }
}

impl PromptStrategy for ReplyPrompt {
    fn instruction(&self, ctx: &EmailContext, files: &[UploadedFileHandle]) -> String {
        let mut prompt = String::from(
            "You are an AI email assistant. Write a specific email response based on the exact context provided below.\n\n",
        );
        prompt.push_str("CRITICAL INSTRUCTIONS:\n");
        prompt.push_str("- Only respond to what was actually mentioned in the original email\n");
        prompt.push_str("- Do NOT make up information or add topics not discussed\n");
        prompt.push_str("- Use the actual sender's name (no placeholders like [Name])\n");
        prompt.push_str("- Keep responses focused and concise\n");
        prompt.push_str("- Do NOT include generic advice unless specifically requested\n\n");

        prompt.push_str("EMAIL CONTEXT:\n");
        if let Some(sender) = sender_line(ctx) {
            let _ = writeln!(prompt, "Sender: {sender}");
        }
        if !ctx.subject().is_empty() {
            let _ = writeln!(prompt, "Subject: {}", ctx.subject());
        }
        if ctx.original_email().is_empty() {
            prompt.push_str("\nThis appears to be a new email composition.\n\n");
        } else {
            let _ = write!(prompt, "\nOriginal message:\n\"{}\"\n\n", ctx.original_email());
        }

        if !files.is_empty() {
            push_file_listing(&mut prompt, files);
            prompt.push_str("Use the attached files where they bear on the reply.\n\n");
        } else if self.analyze_attachments && !ctx.attachments().is_empty() {
            let _ = write!(prompt, "Attachments mentioned: {}\n\n", ctx.attachments());
        }

        let sender_name = if ctx.sender_name().is_empty() {
            "the sender"
        } else {
            ctx.sender_name()
        };
        prompt.push_str("RESPONSE REQUIREMENTS:\n");
        let _ = writeln!(prompt, "- Write in a {} tone", self.tone.description());
        prompt.push_str("- Address only the specific points mentioned in the original email\n");
        let _ = writeln!(prompt, "- Use the sender's actual name ({sender_name})");
        let _ = writeln!(prompt, "- Keep response under {} words", self.word_limit());
        prompt.push_str("- Do not include signature or closing (user will add their own)\n");
        prompt.push_str("- Be specific and relevant to the actual request\n\n");
        prompt.push_str("Write the email response now:");
        prompt
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self
                .max_tokens
                .saturating_mul(4)
                .min(REPLY_OUTPUT_TOKEN_CAP),
            top_k: REPLY_TOP_K,
            top_p: REPLY_TOP_P,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryPrompt;

impl PromptStrategy for SummaryPrompt {
    fn instruction(&self, ctx: &EmailContext, files: &[UploadedFileHandle]) -> String {
        let mut prompt = String::from(
            "Please provide a concise summary of this email, highlighting key points and any action items:\n\n",
        );
        if !ctx.subject().is_empty() {
            let _ = writeln!(prompt, "Subject: {}", ctx.subject());
        }
        if ctx.original_email().is_empty() {
            prompt.push_str("This appears to be a new email composition.\n\n");
        } else {
            let _ = write!(prompt, "Email content:\n{}\n\n", ctx.original_email());
        }
        if !files.is_empty() {
            push_file_listing(&mut prompt, files);
            prompt.push_str("Include anything important from the attached files.\n\n");
        }

        prompt.push_str("Please provide:\n");
        prompt.push_str("1. A brief summary of the main topic\n");
        prompt.push_str("2. Key points mentioned\n");
        prompt.push_str("3. Any action items or requests\n");
        prompt.push_str("4. Important dates or deadlines (if mentioned)\n\n");
        prompt.push_str(
            "Format the response with <strong> tags around important terms and <span class=\"highlight\"> tags around action items.",
        );
        prompt
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: SUMMARY_TEMPERATURE,
            max_output_tokens: SUMMARY_MAX_OUTPUT_TOKENS,
            top_k: SUMMARY_TOP_K,
            top_p: SUMMARY_TOP_P,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatePrompt {
    pub language: String,
}

impl PromptStrategy for TranslatePrompt {
    fn instruction(&self, ctx: &EmailContext, files: &[UploadedFileHandle]) -> String {
        let mut prompt = format!(
            "Translate the following email into {}. Preserve the paragraph structure, names, dates and numbers. Return only the translated text.\n\n",
            self.language
        );
        if !ctx.subject().is_empty() {
            let _ = writeln!(prompt, "Subject: {}", ctx.subject());
        }
        if ctx.original_email().is_empty() {
            prompt.push_str("This appears to be a new email composition.\n");
        } else {
            let _ = writeln!(prompt, "Email content:\n{}", ctx.original_email());
        }
        if !files.is_empty() {
            prompt.push('\n');
            push_file_listing(&mut prompt, files);
            prompt.push_str("Do not translate the attached files; use them only for context.\n");
        }
        prompt.trim_end().to_string()
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: TRANSLATE_TEMPERATURE,
            max_output_tokens: TRANSLATE_MAX_OUTPUT_TOKENS,
            top_k: TRANSLATE_TOP_K,
            top_p: TRANSLATE_TOP_P,
        }
    }
}

fn sender_line(ctx: &EmailContext) -> Option<String> {
    match (ctx.sender_name(), ctx.sender_email()) {
        ("", "") => None,
        (name, "") => Some(name.to_string()),
        ("", email) => Some(email.to_string()),
        (name, email) => Some(format!("{name} ({email})")),
    }
}

fn push_file_listing(prompt: &mut String, files: &[UploadedFileHandle]) {
    prompt.push_str("ATTACHED FILES (provided with this message):\n");
    for file in files {
        let _ = writeln!(prompt, "- {} ({})", file.display_name(), file.mime_type());
    }
    prompt.push('\n');
}

fn summary_patterns() -> &'static [(Regex, &'static str); 5] {
    static PATTERNS: OnceLock<[(Regex, &'static str); 5]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                Regex::new(r"\*\*(.*?)\*\*").expect("static regex"),
                "<strong>$1</strong>",
            ),
            (Regex::new(r"\*(.*?)\*").expect("static regex"), "<em>$1</em>"),
            (
                Regex::new(r"(\d{1,2}/\d{1,2}/\d{2,4}|\d{1,2}-\d{1,2}-\d{2,4})")
                    .expect("static regex"),
                r#"<span class="highlight">$1</span>"#,
            ),
            (
                Regex::new(r"(?i)\b(action|task|todo|deadline|due|urgent|important)\b")
                    .expect("static regex"),
                "<strong>$1</strong>",
            ),
            (Regex::new(r"\n").expect("static regex"), "<br>"),
        ]
    })
}

/// Light HTML markup for a generated summary.
pub fn format_summary(text: &str) -> String {
    summary_patterns()
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> EmailContext {
        EmailContext::builder()
            .subject("Re: Budget")
            .sender("Dana Ortiz", "dana@example.com")
            .original_email("Please send the Q3 numbers by Friday.")
            .build()
    }

    fn reply(tone: Tone) -> ReplyPrompt {
        ReplyPrompt {
            tone,
            max_tokens: 300,
            temperature: 0.7,
            analyze_attachments: false,
        }
    }

    fn pdf() -> UploadedFileHandle {
        UploadedFileHandle::Inline {
            display_name: "q3.pdf".into(),
            mime_type: "application/pdf".into(),
            base64_data: "JVBERg==".into(),
        }
    }

    #[test]
    fn reply_prompt_carries_context_and_limits() {
        let prompt = reply(Tone::Brief).instruction(&context(), &[]);
        assert!(prompt.contains("Sender: Dana Ortiz (dana@example.com)"));
        assert!(prompt.contains("Subject: Re: Budget"));
        assert!(prompt.contains("\"Please send the Q3 numbers by Friday.\""));
        assert!(prompt.contains("- Write in a concise and direct tone"));
        assert!(prompt.contains("- Keep response under 225 words"));
        assert!(prompt.ends_with("Write the email response now:"));
        assert!(!prompt.contains("ATTACHED FILES"));
    }

    #[test]
    fn prompts_are_deterministic() {
        let files = vec![pdf()];
        let strategy = reply(Tone::Formal);
        assert_eq!(
            strategy.instruction(&context(), &files),
            strategy.instruction(&context(), &files)
        );
        assert_eq!(
            SummaryPrompt.instruction(&context(), &files),
            SummaryPrompt.instruction(&context(), &files)
        );
    }

    #[test]
    fn uploaded_files_are_listed_by_name_and_type() {
        let prompt = reply(Tone::Casual).instruction(&context(), &[pdf()]);
        assert!(prompt.contains("ATTACHED FILES (provided with this message):\n- q3.pdf (application/pdf)\n"));
    }

    #[test]
    fn empty_context_reads_as_new_composition() {
        let ctx = EmailContext::builder().build();
        let prompt = reply(Tone::Formal).instruction(&ctx, &[]);
        assert!(prompt.contains("This appears to be a new email composition."));
        assert!(prompt.contains("(the sender)"));
        assert!(!prompt.contains("Sender:"));
    }

    #[test]
    fn reply_token_budget_is_capped() {
        let mut strategy = reply(Tone::Formal);
        assert_eq!(strategy.generation_config().max_output_tokens, 1024);
        strategy.max_tokens = 100;
        let config = strategy.generation_config();
        assert_eq!(config.max_output_tokens, 400);
        assert_eq!(config.top_k, 40);
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn summary_uses_fixed_sampling() {
        let config = SummaryPrompt.generation_config();
        assert_eq!(config.max_output_tokens, 512);
        assert_eq!(config.top_k, 20);
        assert!(SummaryPrompt
            .instruction(&context(), &[])
            .contains("Email content:\nPlease send the Q3 numbers by Friday."));
    }

    #[test]
    fn translate_names_target_language() {
        let prompt = TranslatePrompt {
            language: "Spanish".into(),
        }
        .instruction(&context(), &[]);
        assert!(prompt.starts_with("Translate the following email into Spanish."));
        assert!(prompt.ends_with("Please send the Q3 numbers by Friday."));
    }

    #[test]
    fn summary_markup() {
        let formatted = format_summary("**Budget** is *urgent*\nDue 10/31/2024, actions pending");
        assert_eq!(
            formatted,
            "<strong>Budget</strong> is <em><strong>urgent</strong></em><br><strong>Due</strong> <span class=\"highlight\">10/31/2024</span>, actions pending"
        );
    }
}
