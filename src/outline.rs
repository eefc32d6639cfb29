use std::{collections::HashSet, fmt, sync::Arc};

use anyhow::{Context, Result as AnyResult, ensure};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::llm::LlmClient;

/// A generated presentation outline, as echoed over the wire in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub topic: String,
    pub presentation_title: String,
    pub target_audience: String,
    pub slides: Vec<Slide>,
}

/// One slide of an outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub slide_number: u32,
    pub title: String,
    pub bullet_points: Vec<String>,
    pub visual_suggestion: String,
}

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug)]
pub enum GenerationError {
    /// The topic was empty or whitespace-only; no request was made.
    InvalidTopic,
    /// The provider could not be reached or refused the request.
    RequestFailed(String),
    /// The provider answered, but the body was not a valid outline.
    MalformedResponse(String),
}

impl GenerationError {
    pub(crate) fn request_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            GenerationError::RequestFailed("The generation service could not be reached".into())
        } else {
            GenerationError::RequestFailed(message)
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::InvalidTopic => write!(f, "Topic must not be empty"),
            GenerationError::RequestFailed(msg) => write!(f, "Generation request failed: {msg}"),
            GenerationError::MalformedResponse(msg) => {
                write!(f, "Generation service returned a malformed outline: {msg}")
            }
        }
    }
}

impl std::error::Error for GenerationError {}

const PROMPT_TEMPLATE_NAME: &str = "outline_prompt";

const DEFAULT_PROMPT_TEMPLATE: &str = "\
Generate a detailed presentation outline for the study topic: \"{{{topic}}}\".
The outline should be educational, structured for a student or professional presentation, \
and include {{min_slides}} to {{max_slides}} slides.
Include a clear introduction, core concepts and theories, examples or applications, and a summary slide.
Respond with a single JSON object only, no prose and no code fences, matching this schema exactly:

{{{schema}}}
";

/// The JSON shape the provider is asked to produce. Embedded in the prompt and
/// enforced again on the way back in, since provider-side schema support is
/// not a contractual guarantee across models.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "topic": { "type": "string" },
            "presentationTitle": { "type": "string" },
            "targetAudience": { "type": "string" },
            "slides": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "slideNumber": { "type": "number" },
                        "title": { "type": "string" },
                        "bulletPoints": {
                            "type": "array",
                            "items": { "type": "string" }
                        },
                        "visualSuggestion": { "type": "string" }
                    },
                    "required": ["slideNumber", "title", "bulletPoints", "visualSuggestion"]
                }
            }
        },
        "required": ["topic", "presentationTitle", "targetAudience", "slides"]
    })
}

/// Turns a study topic into a validated [`Outline`] through one LLM round trip.
///
/// Holds no mutable state; a single instance is shared across concurrent
/// requests and each call is independent.
pub struct OutlineGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    min_slides: usize,
    max_slides: usize,
    handlebars: Handlebars<'static>,
}

impl OutlineGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        generation: &GenerationConfig,
    ) -> AnyResult<Self> {
        let model = model.into();
        ensure!(!model.trim().is_empty(), "Model identifier may not be empty");

        let template = generation
            .prompt_template
            .clone()
            .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string());
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars
            .register_template_string(PROMPT_TEMPLATE_NAME, &template)
            .context("Invalid outline prompt template")?;

        Ok(Self {
            llm,
            model,
            min_slides: generation.min_slides,
            max_slides: generation.max_slides,
            handlebars,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates an outline for `topic`. Exactly one outbound call per
    /// invocation; a failed attempt is surfaced immediately, never retried.
    pub async fn generate(&self, topic: &str) -> Result<Outline> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(GenerationError::InvalidTopic);
        }

        let prompt = self
            .build_prompt(topic)
            .map_err(|err| GenerationError::request_failed(err.to_string()))?;
        debug!(model = %self.model, chars = prompt.len(), "sending outline prompt");

        let raw = self
            .llm
            .sample(&prompt, Some(&self.model))
            .await
            .map_err(|err| {
                warn!(error = %err, "outline generation request failed");
                GenerationError::request_failed(err.to_string())
            })?;

        let outline = parse_outline(&raw)?;
        info!(topic, slides = outline.slides.len(), "outline generated");
        Ok(outline)
    }

    fn build_prompt(&self, topic: &str) -> AnyResult<String> {
        let data = json!({
            "topic": topic,
            "min_slides": self.min_slides,
            "max_slides": self.max_slides,
            "schema": serde_json::to_string_pretty(&response_schema())?,
        });
        self.handlebars
            .render(PROMPT_TEMPLATE_NAME, &data)
            .context("Failed to render outline prompt")
    }
}

fn parse_outline(raw: &str) -> Result<Outline> {
    let fragment = extract_json_object(raw).ok_or_else(|| {
        GenerationError::MalformedResponse("response contained no JSON object".into())
    })?;
    let outline: Outline = serde_json::from_str(&fragment)
        .map_err(|err| GenerationError::MalformedResponse(format!("invalid outline JSON: {err}")))?;
    validate_outline(&outline)?;
    Ok(outline)
}

/// Shape checks beyond what deserialization enforces. Violations are reported
/// as [`GenerationError::MalformedResponse`]; nothing is coerced or dropped.
fn validate_outline(outline: &Outline) -> Result<()> {
    if outline.slides.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "slides must not be empty".into(),
        ));
    }

    let mut seen = HashSet::new();
    for slide in &outline.slides {
        if slide.slide_number == 0 {
            return Err(GenerationError::MalformedResponse(format!(
                "slide \"{}\" has slideNumber 0",
                slide.title
            )));
        }
        if !seen.insert(slide.slide_number) {
            return Err(GenerationError::MalformedResponse(format!(
                "duplicate slideNumber {}",
                slide.slide_number
            )));
        }
        if slide.bullet_points.is_empty() {
            return Err(GenerationError::MalformedResponse(format!(
                "slide {} has no bullet points",
                slide.slide_number
            )));
        }
        if slide.bullet_points.iter().any(|point| point.trim().is_empty()) {
            return Err(GenerationError::MalformedResponse(format!(
                "slide {} has a blank bullet point",
                slide.slide_number
            )));
        }
    }
    Ok(())
}

/// Extracts the first complete JSON object from `raw`, tolerating code fences
/// or prose around it. Brace depth is tracked outside of string literals.
fn extract_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..=start + idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
