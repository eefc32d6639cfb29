use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Slideforge CLI definition.
#[derive(Debug, Parser)]
#[command(name = "slideforge")]
#[command(about = "Study-topic presentation outline generator", version)]
pub struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Emit log output as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the web UI and the outline generation API.
    Serve(ServeArgs),
    /// Generate a single outline and print it to stdout.
    Generate(GenerateArgs),
}

/// Flags shared by every command that talks to an LLM provider.
#[derive(Debug, Args, Clone)]
pub struct LlmArgs {
    #[arg(long, help = "Path to an optional YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "LLM provider API key (can also come from env vars)")]
    pub api_key: Option<String>,

    #[arg(
        long,
        default_value = "gemini-3-flash-preview",
        help = "Model identifier (a config file `generation.model` takes precedence)"
    )]
    pub llm_model: String,

    #[arg(
        long,
        default_value_t = LlmProvider::Gemini,
        value_enum,
        help = "LLM provider backend (gemini, openai, anthropic, grok)"
    )]
    pub llm_provider: LlmProvider,
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub llm: LlmArgs,

    #[arg(long, help = "Bind address (defaults to the configured value)")]
    pub bind: Option<String>,

    #[arg(long, help = "Listen port (defaults to the configured value)")]
    pub port: Option<u16>,

    #[arg(long, default_value_t = 4, help = "Maximum concurrent LLM calls")]
    pub max_concurrent_llm: usize,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub llm: LlmArgs,

    #[arg(long, help = "Study topic to build an outline for")]
    pub topic: String,

    #[arg(long, help = "Print the outline as pretty JSON instead of text")]
    pub json: bool,
}

/// Supported LLM providers surfaced via the CLI.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[clap(rename_all = "lower")]
pub enum LlmProvider {
    Gemini,
    Openai,
    Anthropic,
    Grok,
}

impl LlmProvider {
    pub fn env_var(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::Openai => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Grok => "XAI_API_KEY",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::Openai => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Grok => "grok",
        }
    }
}
