use std::{cmp::max, sync::Arc};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rig::{
    client::CompletionClient,
    completion::Prompt,
    providers::{anthropic, gemini, openai, xai},
};
use tokio::sync::Semaphore;

use crate::cli::LlmProvider;

/// Abstraction over whichever LLM backend is configured.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn sample(&self, prompt: &str, model: Option<&str>) -> Result<String>;
}

/// Concrete [`LlmClient`] backed by `rig`'s provider clients.
#[derive(Clone)]
pub struct RigLlmClient {
    inner: Arc<RigLlmClientInner>,
}

struct RigLlmClientInner {
    provider: LlmProvider,
    default_model: String,
    // Absent or blank keys are tolerated until the first request, so that a
    // misconfigured deployment starts up and reports the problem per call.
    api_key: Option<String>,
    temperature: Option<f64>,
    http_client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

impl RigLlmClient {
    pub fn new(
        provider: LlmProvider,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: Option<f64>,
        max_concurrent: usize,
    ) -> Result<Self> {
        let default_model = model.into();
        if default_model.trim().is_empty() {
            return Err(anyhow!("Model identifier may not be empty"));
        }

        let http_client = build_http_client()?;
        let limit = max(1, max_concurrent);
        Ok(Self {
            inner: Arc::new(RigLlmClientInner {
                provider,
                default_model,
                api_key: api_key.and_then(|key| {
                    let trimmed = key.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }),
                temperature,
                http_client,
                semaphore: Arc::new(Semaphore::new(limit)),
            }),
        })
    }

    fn require_api_key(&self) -> Result<&str> {
        self.inner.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "No API key configured: pass --api-key or set {}",
                self.inner.provider.env_var()
            )
        })
    }
}

impl std::fmt::Debug for RigLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigLlmClient")
            .field("provider", &self.inner.provider)
            .field("default_model", &self.inner.default_model)
            .field("has_api_key", &self.inner.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl LlmClient for RigLlmClient {
    async fn sample(&self, prompt: &str, model_override: Option<&str>) -> Result<String> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Semaphore closed while waiting for LLM slot")?;

        let model = model_override.unwrap_or(&self.inner.default_model);
        let response = self.prompt_once(model, prompt).await;

        drop(permit);
        response
    }
}

impl RigLlmClient {
    async fn prompt_once(&self, model: &str, prompt: &str) -> Result<String> {
        let api_key = self.require_api_key()?;
        let temperature = self.inner.temperature;
        match self.inner.provider {
            LlmProvider::Gemini => {
                let client: gemini::Client<reqwest::Client> =
                    gemini::Client::<reqwest::Client>::builder()
                        .api_key(api_key)
                        .http_client(self.inner.http_client.clone())
                        .build()
                        .map_err(|err| anyhow!("Failed to create Gemini client: {err}"))?;

                let mut agent_builder = client.agent(model);
                if let Some(temp) = temperature {
                    agent_builder = agent_builder.temperature(temp);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| anyhow!("Gemini prompt error: {err}"))
            }
            LlmProvider::Openai => {
                let client: openai::Client<reqwest::Client> =
                    openai::Client::<reqwest::Client>::builder()
                        .api_key(api_key)
                        .http_client(self.inner.http_client.clone())
                        .build()
                        .map_err(|err| anyhow!("Failed to create OpenAI client: {err}"))?;

                let mut agent_builder = client.agent(model);
                if let Some(temp) = temperature {
                    agent_builder = agent_builder.temperature(temp);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| anyhow!("OpenAI prompt error: {err}"))
            }
            LlmProvider::Anthropic => {
                let client: anthropic::Client<reqwest::Client> =
                    anthropic::Client::<reqwest::Client>::builder()
                        .api_key(api_key)
                        .http_client(self.inner.http_client.clone())
                        .build()
                        .map_err(|err| anyhow!("Failed to create Anthropic client: {err}"))?;

                let mut agent_builder = client.agent(model);
                if let Some(temp) = temperature {
                    agent_builder = agent_builder.temperature(temp);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| anyhow!("Anthropic prompt error: {err}"))
            }
            LlmProvider::Grok => {
                let client: xai::Client<reqwest::Client> =
                    xai::Client::<reqwest::Client>::builder()
                        .api_key(api_key)
                        .http_client(self.inner.http_client.clone())
                        .build()
                        .map_err(|err| anyhow!("Failed to create xAI client: {err}"))?;

                let mut agent_builder = client.agent(model);
                if let Some(temp) = temperature {
                    agent_builder = agent_builder.temperature(temp);
                }
                agent_builder
                    .build()
                    .prompt(prompt)
                    .await
                    .map_err(|err| anyhow!("xAI prompt error: {err}"))
            }
        }
    }
}

fn build_http_client() -> Result<reqwest::Client> {
    // `reqwest::Client::default()` can consult OS-level proxy settings.
    // On macOS this can involve `system-configuration`, which has been observed to panic in
    // sandboxed/restricted environments. We avoid that path by default.
    //
    // If one explicitly wants OS-level proxy discovery, opt in with:
    // `SLIDEFORGE_ENABLE_SYSTEM_PROXY=1`.
    let mut builder = reqwest::Client::builder();
    if std::env::var_os("SLIDEFORGE_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}
