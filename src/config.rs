use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;

/// Optional on-disk configuration. Every field has a default, so running
/// without a config file is the common case.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SlideforgeConfig {
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

impl SlideforgeConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {}", path_ref.display()))?;
        let mut config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;
        let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
        config
            .generation
            .hydrate_template(base_dir)
            .with_context(|| format!("Failed to hydrate templates for {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Unable to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

impl FromStr for SlideforgeConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml_str(s)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    /// Overrides the CLI model flag when set.
    pub model: Option<String>,
    pub min_slides: usize,
    pub max_slides: usize,
    pub temperature: Option<f64>,
    /// Inline template text, or a path to a template file relative to the
    /// config file. Rendered with `topic`, `min_slides`, `max_slides` and
    /// `schema` variables.
    pub prompt_template: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            min_slides: 7,
            max_slides: 10,
            temperature: None,
            prompt_template: None,
        }
    }
}

impl GenerationConfig {
    fn hydrate_template(&mut self, base_dir: &Path) -> Result<()> {
        if let Some(template) = &self.prompt_template {
            self.prompt_template = Some(resolve_prompt_template(template, base_dir)?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.min_slides >= 1, "generation.min_slides must be >= 1");
        ensure!(
            self.min_slides <= self.max_slides,
            "generation.min_slides must not exceed generation.max_slides"
        );
        if let Some(model) = &self.model {
            ensure!(
                !model.trim().is_empty(),
                "generation.model must not be blank"
            );
        }
        if let Some(temp) = self.temperature {
            ensure!(
                (0.0..=2.0).contains(&temp),
                "generation.temperature must be between 0 and 2"
            );
        }
        if let Some(template) = &self.prompt_template {
            ensure!(
                !template.trim().is_empty(),
                "generation.prompt_template must not be blank"
            );
            ensure!(
                template.contains("topic}}"),
                "generation.prompt_template must reference the {{topic}} variable"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        ensure!(!self.bind.trim().is_empty(), "server.bind must not be blank");
        Ok(())
    }
}

fn resolve_prompt_template(raw: &str, base_dir: &Path) -> Result<String> {
    if raw.contains('\n') {
        return Ok(raw.to_string());
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let candidate = Path::new(trimmed);
    let joined: PathBuf = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    if joined.exists() && joined.is_file() {
        return fs::read_to_string(&joined)
            .with_context(|| format!("Failed to read prompt template {}", joined.display()));
    }

    if looks_like_template_path(trimmed) {
        return Err(anyhow!(
            "Prompt template '{}' was not found relative to {}",
            trimmed,
            base_dir.display()
        ));
    }

    Ok(raw.to_string())
}

fn looks_like_template_path(value: &str) -> bool {
    value.contains('/')
        || value.contains('\\')
        || value.ends_with(".hbs")
        || value.ends_with(".handlebars")
        || value.ends_with(".tmpl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_canonical_variant() {
        let config = SlideforgeConfig::default();
        assert_eq!(config.generation.min_slides, 7);
        assert_eq!(config.generation.max_slides, 10);
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.bind, "127.0.0.1");
        config.validate().expect("defaults valid");
    }

    #[test]
    fn loads_config_from_str() {
        let yaml = r#"
        generation:
          model: "gemini-3-flash-preview"
          min_slides: 6
          max_slides: 8
          temperature: 0.4
        server:
          bind: "0.0.0.0"
          port: 9000
        "#;

        let config = SlideforgeConfig::from_yaml_str(yaml).expect("valid config");
        assert_eq!(config.generation.min_slides, 6);
        assert_eq!(config.generation.max_slides, 8);
        assert_eq!(config.generation.temperature, Some(0.4));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn from_path_hydrates_template_file() {
        let temp = tempdir().unwrap();
        let templates = temp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        fs::write(
            templates.join("outline.hbs"),
            "Outline {{{topic}}} in {{max_slides}} slides.",
        )
        .unwrap();

        let config_path = temp.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
generation:
  prompt_template: "templates/outline.hbs"
"#,
        )
        .unwrap();

        let config = SlideforgeConfig::from_path(&config_path).expect("config loads");
        assert_eq!(
            config.generation.prompt_template.as_deref(),
            Some("Outline {{{topic}}} in {{max_slides}} slides.")
        );
    }

    #[test]
    fn missing_template_file_is_rejected() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
generation:
  prompt_template: "templates/missing.hbs"
"#,
        )
        .unwrap();

        let err = SlideforgeConfig::from_path(&config_path).unwrap_err();
        let messages: Vec<String> = err.chain().map(|cause| cause.to_string()).collect();
        assert!(
            messages.iter().any(|msg| msg.contains("not found")),
            "error chain missing template diagnostic: {messages:?}"
        );
    }

    #[test]
    fn rejects_inverted_slide_bounds() {
        let yaml = r#"
        generation:
          min_slides: 9
          max_slides: 3
        "#;
        let err = SlideforgeConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("min_slides"));
    }

    #[test]
    fn rejects_template_without_topic_variable() {
        let yaml = r#"
        generation:
          prompt_template: "Write some slides please"
        "#;
        let err = SlideforgeConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("topic"));
    }
}
