use std::{
    fs,
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use anyhow::{Context as AnyhowContext, Result, anyhow, bail};
use clap::Parser;

use slideforge::{
    cli::{Cli, Commands, GenerateArgs, LlmArgs, LlmProvider, ServeArgs},
    config::SlideforgeConfig,
    llm::{LlmClient, RigLlmClient},
    outline::{Outline, OutlineGenerator},
    paths::home_env_path,
    server,
    session::{GenerationState, OutlineSession},
};

mod tracing_setup;

static HOME_ENV_ONCE: OnceLock<()> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = matches!(cli.command, Commands::Serve(_)).then_some("slideforge.log");
    let _guard = tracing_setup::init(cli.verbose, cli.log_json, log_file);

    match cli.command {
        Commands::Serve(args) => serve_command(args).await?,
        Commands::Generate(args) => generate_command(args).await?,
    }
    Ok(())
}

async fn serve_command(args: ServeArgs) -> Result<()> {
    let config = load_config(&args.llm)?;
    let generator = build_generator(&args.llm, &config, args.max_concurrent_llm)?;

    let bind = args
        .bind
        .clone()
        .unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .context("Invalid bind/port combination for serve command")?;

    println!("Serving slideforge on http://{addr}");
    server::run(addr, generator).await
}

async fn generate_command(args: GenerateArgs) -> Result<()> {
    if args.topic.trim().is_empty() {
        bail!("Topic must not be empty");
    }

    let config = load_config(&args.llm)?;
    let generator = build_generator(&args.llm, &config, 1)?;
    let mut session = OutlineSession::new(generator);

    match session.submit(&args.topic).await {
        GenerationState::Success(outline) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(outline)?);
            } else {
                print!("{}", format_outline(outline));
            }
            Ok(())
        }
        GenerationState::Error(message) => Err(anyhow!("{message}")),
        state => Err(anyhow!("Unexpected generation state: {state:?}")),
    }
}

fn load_config(args: &LlmArgs) -> Result<SlideforgeConfig> {
    match &args.config {
        Some(path) => SlideforgeConfig::from_path(path),
        None => Ok(SlideforgeConfig::default()),
    }
}

/// Constructs the LLM client and generator once; both are passed explicitly
/// into whoever needs them rather than living in process-wide state.
fn build_generator(
    args: &LlmArgs,
    config: &SlideforgeConfig,
    max_concurrent: usize,
) -> Result<Arc<OutlineGenerator>> {
    let api_key = resolve_api_key(args.api_key.clone(), args.llm_provider);
    if api_key.is_none() {
        tracing::warn!(
            provider = args.llm_provider.as_str(),
            env_var = args.llm_provider.env_var(),
            "no API key configured; generation requests will fail until one is provided"
        );
    }

    let model = config
        .generation
        .model
        .clone()
        .unwrap_or_else(|| args.llm_model.clone());
    let llm: Arc<dyn LlmClient> = Arc::new(RigLlmClient::new(
        args.llm_provider,
        api_key,
        model.clone(),
        config.generation.temperature,
        max_concurrent,
    )?);

    Ok(Arc::new(OutlineGenerator::new(
        llm,
        model,
        &config.generation,
    )?))
}

fn format_outline(outline: &Outline) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "PRESENTATION: {}", outline.presentation_title);
    let _ = writeln!(out, "AUDIENCE: {}", outline.target_audience);
    for slide in &outline.slides {
        let _ = writeln!(out);
        let _ = writeln!(out, "SLIDE {}: {}", slide.slide_number, slide.title);
        for point in &slide.bullet_points {
            let _ = writeln!(out, "  - {point}");
        }
        let _ = writeln!(out, "  [Visual]: {}", slide.visual_suggestion);
    }
    out
}

fn resolve_api_key(cli_value: Option<String>, provider: LlmProvider) -> Option<String> {
    ensure_home_env_loaded();
    let env_value = std::env::var(provider.env_var()).ok();
    pick_api_key(cli_value, env_value)
}

fn pick_api_key(cli_value: Option<String>, env_value: Option<String>) -> Option<String> {
    normalize_key(cli_value).or_else(|| normalize_key(env_value))
}

fn normalize_key(value: Option<String>) -> Option<String> {
    value.and_then(|candidate| {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn ensure_home_env_loaded() {
    HOME_ENV_ONCE.get_or_init(|| {
        if let Some(path) = home_env_path()
            && let Ok(contents) = fs::read_to_string(&path)
        {
            apply_env_contents(&contents);
        }
    });
}

fn apply_env_contents(contents: &str) {
    for line in contents.lines() {
        if let Some((key, value)) = parse_env_assignment(line)
            && std::env::var_os(&key).is_none()
        {
            unsafe {
                std::env::set_var(&key, &value);
            }
        }
    }
}

fn parse_env_assignment(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim();

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = normalize_env_value(value.trim());
    Some((key.to_string(), value))
}

fn normalize_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('\"') && trimmed.ends_with('\"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}
