use std::{io::ErrorKind, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use slideforge::{
    Outline, OutlineGenerator,
    config::GenerationConfig,
    llm::LlmClient,
    server,
};
use tokio::{
    net::TcpListener,
    time::{Duration, sleep},
};

const OUTLINE_JSON: &str = r#"{"topic":"Photosynthesis","presentationTitle":"Understanding Photosynthesis","targetAudience":"High school students","slides":[{"slideNumber":1,"title":"Introduction","bulletPoints":["What is photosynthesis?"],"visualSuggestion":"Diagram of a leaf cross-section"}]}"#;

struct FixedLlm(Result<&'static str, &'static str>);

#[async_trait]
impl LlmClient for FixedLlm {
    async fn sample(&self, _prompt: &str, _model: Option<&str>) -> anyhow::Result<String> {
        match self.0 {
            Ok(body) => Ok(body.to_string()),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

/// Spawns the real server on an ephemeral port with a scripted LLM backend.
/// Returns `None` when the sandbox forbids binding sockets.
async fn spawn_server(outcome: Result<&'static str, &'static str>) -> Result<Option<String>> {
    let listener = match TcpListener::bind(("127.0.0.1", 0)).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            eprintln!("skipping: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let addr = listener.local_addr()?;

    let generator = Arc::new(OutlineGenerator::new(
        Arc::new(FixedLlm(outcome)),
        "gemini-3-flash-preview",
        &GenerationConfig::default(),
    )?);

    tokio::spawn(async move {
        if let Err(err) = server::run_with_listener(listener, generator).await {
            eprintln!("serve task exited: {err:?}");
        }
    });
    sleep(Duration::from_millis(150)).await;

    Ok(Some(format!("http://{}:{}", addr.ip(), addr.port())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_route_round_trips_an_outline() -> Result<()> {
    let Some(base) = spawn_server(Ok(OUTLINE_JSON)).await? else {
        return Ok(());
    };
    let client = Client::builder().build()?;

    let outline: Outline = client
        .post(format!("{base}/api/generate"))
        .json(&serde_json::json!({ "topic": "Photosynthesis" }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    assert_eq!(outline.topic, "Photosynthesis");
    assert_eq!(outline.slides.len(), 1);
    assert_eq!(outline.slides[0].bullet_points.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_route_rejects_blank_topic_and_wrong_method() -> Result<()> {
    let Some(base) = spawn_server(Ok(OUTLINE_JSON)).await? else {
        return Ok(());
    };
    let client = Client::builder().build()?;

    let blank = client
        .post(format!("{base}/api/generate"))
        .json(&serde_json::json!({ "topic": "   " }))
        .send()
        .await?;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = blank.json().await?;
    assert!(body["error"].is_string(), "400 body carries an error field");

    let wrong_method = client.get(format!("{base}/api/generate")).send().await?;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: serde_json::Value = wrong_method.json().await?;
    assert!(body["error"].is_string(), "405 body carries an error field");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_failure_surfaces_as_500_with_message() -> Result<()> {
    let Some(base) = spawn_server(Err("quota exceeded")).await? else {
        return Ok(());
    };
    let client = Client::builder().build()?;

    let response = client
        .post(format!("{base}/api/generate"))
        .json(&serde_json::json!({ "topic": "Photosynthesis" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = response.json().await?;
    let message = body["error"].as_str().expect("error message present");
    assert!(message.contains("quota exceeded"), "passthrough: {message}");
    Ok(())
}
