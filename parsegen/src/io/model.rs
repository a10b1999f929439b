//! Clients for the generative model that writes programs.
//!
//! [`ModelClient`] is the seam between the generator and the service: one prompt
//! in, one completion out. The CLI builds a client from config with
//! [`build_client`]; tests substitute scripted clients.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{GeneratorConfig, GeneratorKind};
use crate::io::process::{render_command, run_command_with_timeout};

const COMMAND_OUTPUT_LIMIT_BYTES: usize = 10_000_000;

/// A text-completion backend.
pub trait ModelClient {
    /// Send one prompt and return the raw completion text.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the client selected by `generator.kind`.
///
/// Fails before any request is made when the configured credential is missing.
pub fn build_client(config: &GeneratorConfig) -> Result<Box<dyn ModelClient>> {
    let client: Box<dyn ModelClient> = match config.kind {
        GeneratorKind::Gemini => Box::new(GeminiClient::from_config(config)?),
        GeneratorKind::Command => Box::new(CommandClient::from_config(config)),
    };
    Ok(client)
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    url: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} is not set; export it or switch generator.kind to \"command\"",
                    config.api_key_env
                )
            })?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            url: format!(
                "{}/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.model
            ),
            api_key,
            temperature: config.temperature,
        })
    }
}

impl ModelClient for GeminiClient {
    #[instrument(skip_all, fields(url = %self.url, prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": self.temperature},
        });
        info!("requesting completion");
        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .context("send generateContent request")?;
        let status = response.status();
        let text = response.text().context("read generateContent response")?;
        if !status.is_success() {
            warn!(%status, "generation service returned an error");
            return Err(anyhow!(
                "generation service returned {status}: {}",
                error_message(&text)
            ));
        }
        let completion = extract_text(&text)?;
        debug!(completion_bytes = completion.len(), "completion received");
        Ok(completion)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(response: &str) -> Result<String> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(response).context("parse generateContent response")?;
    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(anyhow!("generation service returned no completion: {reason}"));
    };
    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        return Err(anyhow!(
            "generation service returned an empty completion (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }
    Ok(text)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(500).collect())
}

/// Any command that reads a prompt on stdin and prints a completion on stdout.
#[derive(Debug, Clone)]
pub struct CommandClient {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl ModelClient for CommandClient {
    #[instrument(skip_all, fields(program = ?self.command.first(), prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let cmd = render_command(&self.command, &[])?;
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            COMMAND_OUTPUT_LIMIT_BYTES,
        )
        .context("run generator command")?;
        if output.timed_out {
            return Err(anyhow!(
                "generator command timed out after {}s",
                self.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "generator command failed with status {:?}: {}",
                output.status.code(),
                output.last_stderr_line().unwrap_or_default()
            ));
        }
        let completion = output.stdout_lossy();
        debug!(completion_bytes = completion.len(), "completion received");
        Ok(completion)
    }
}
