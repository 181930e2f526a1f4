use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "replysmith",
    version,
    about = "Draft, summarize and translate emails with Gemini, attachments included"
)]
pub struct Cli {
    /// YAML config file (defaults to ./replysmith.yaml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Write a JSON run summary (requests, tokens, retries, upload funnel) here
    #[arg(long, global = true)]
    pub telemetry: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Draft a reply
    Reply {
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Summarize the message as lightly marked-up HTML
    Summarize {
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Translate the message
    Translate {
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// Run the action selected in the config (or --action)
    Run {
        #[arg(long)]
        action: Option<String>,
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        generation: GenerationArgs,
    },
    /// List attachment candidates found in a saved page, one JSON object per line
    Scan {
        #[arg(long)]
        page: PathBuf,
        /// Base URL for resolving relative links
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Check that the configured API key is accepted
    CheckKey {
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ContextArgs {
    #[arg(long, default_value = "")]
    pub subject: String,
    #[arg(long, default_value = "")]
    pub from_name: String,
    #[arg(long, default_value = "")]
    pub from_email: String,
    #[arg(long, default_value = "")]
    pub to: String,
    /// Body of the message being answered
    #[arg(long, conflicts_with = "original_file")]
    pub original: Option<String>,
    /// Read the message body from a file ("-" for stdin)
    #[arg(long)]
    pub original_file: Option<PathBuf>,
    /// Saved HTML of the open message, scanned for attachments
    #[arg(long)]
    pub page: Option<PathBuf>,
    /// Base URL for resolving relative attachment links in --page
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GenerationArgs {
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub tone: Option<String>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub temperature: Option<f32>,
    /// Mention attachment names in the prompt
    #[arg(long)]
    pub analyze_attachments: bool,
    /// Fetch and upload attachments alongside the prompt
    #[arg(long)]
    pub multimodal: bool,
    /// Target language for translate
    #[arg(long)]
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reply_with_context_and_overrides() {
        let cli = Cli::try_parse_from([
            "replysmith",
            "--config",
            "cfg.yaml",
            "reply",
            "--subject",
            "Re: Budget",
            "--original",
            "Please send the Q3 numbers by Friday.",
            "--tone",
            "brief",
            "--multimodal",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yaml")));
        match cli.cmd {
            Command::Reply {
                context,
                generation,
            } => {
                assert_eq!(context.subject, "Re: Budget");
                assert_eq!(generation.tone.as_deref(), Some("brief"));
                assert!(generation.multimodal);
                assert!(!generation.analyze_attachments);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn original_and_original_file_conflict() {
        let parsed = Cli::try_parse_from([
            "replysmith",
            "summarize",
            "--original",
            "x",
            "--original-file",
            "mail.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn scan_requires_page() {
        assert!(Cli::try_parse_from(["replysmith", "scan"]).is_err());
        assert!(Cli::try_parse_from(["replysmith", "scan", "--page", "mail.html"]).is_ok());
    }
}
