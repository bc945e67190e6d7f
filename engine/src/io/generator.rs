//! Code generator backends.
//!
//! The generator is an opaque collaborator: `(schema, rules, prior failure?)`
//! in, candidate code out. Whatever goes wrong on its side surfaces as
//! [`GeneratorUnavailable`], which ends an engine run without burning retries.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::Feedback;
use crate::io::config::{EngineConfig, GeneratorBackend, HttpConfig};
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

/// The generator could not be reached or returned unusable output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("code generator unavailable: {reason}")]
pub struct GeneratorUnavailable {
    pub reason: String,
}

impl GeneratorUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Everything a generator needs to produce a candidate for one run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub schema_text: String,
    pub rules_json: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub category_column: String,
    pub default_category: String,
    pub sentinel: String,
}

pub trait CodeGenerator {
    /// First candidate for a run.
    fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorUnavailable>;

    /// Corrected candidate after `prior_code` failed with `feedback`.
    fn repair(
        &self,
        request: &GenerationRequest,
        prior_code: &str,
        feedback: &Feedback,
    ) -> Result<String, GeneratorUnavailable>;
}

/// Build the configured generator backend.
pub fn build_generator(config: &EngineConfig) -> Result<Box<dyn CodeGenerator>> {
    let generator: Box<dyn CodeGenerator> = match config.generator.backend {
        GeneratorBackend::Http => Box::new(HttpGenerator::new(
            config.generator.http.clone(),
            config.generator_timeout(),
        )?),
        GeneratorBackend::Command => Box::new(CommandGenerator {
            command: config.generator.command.clone(),
            timeout: config.generator_timeout(),
            output_limit_bytes: config.output_limit_bytes,
            prompts: PromptEngine::new(),
        }),
    };
    Ok(generator)
}

/// OpenAI-compatible chat completions backend.
pub struct HttpGenerator {
    config: HttpConfig,
    client: reqwest::blocking::Client,
    prompts: PromptEngine,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpGenerator {
    pub fn new(config: HttpConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            config,
            client,
            prompts: PromptEngine::new(),
        })
    }

    #[instrument(skip_all, fields(endpoint = %self.config.endpoint, model = %self.config.model))]
    fn complete(&self, prompt: &str) -> Result<String, GeneratorUnavailable> {
        let api_key = std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GeneratorUnavailable::new(format!(
                    "{} environment variable not set",
                    self.config.api_key_env
                ))
            })?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": self.prompts.system()},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        info!("requesting candidate code");
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|err| {
                warn!(err = %err, "generator request failed");
                GeneratorUnavailable::new(format!("request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(status = %status, "generator returned an error status");
            return Err(GeneratorUnavailable::new(format!(
                "api error {status}: {}",
                text.trim()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|err| GeneratorUnavailable::new(format!("malformed response: {err}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GeneratorUnavailable::new("response carried no message content"))?;
        usable_code(&content)
    }
}

impl CodeGenerator for HttpGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorUnavailable> {
        let prompt = self
            .prompts
            .render_generate(request)
            .map_err(|err| GeneratorUnavailable::new(format!("render prompt: {err:#}")))?;
        self.complete(&prompt)
    }

    fn repair(
        &self,
        request: &GenerationRequest,
        prior_code: &str,
        feedback: &Feedback,
    ) -> Result<String, GeneratorUnavailable> {
        let prompt = self
            .prompts
            .render_repair(request, prior_code, feedback)
            .map_err(|err| GeneratorUnavailable::new(format!("render prompt: {err:#}")))?;
        self.complete(&prompt)
    }
}

/// Backend that pipes the prompt into a local command and reads code from its stdout.
pub struct CommandGenerator {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub prompts: PromptEngine,
}

impl CommandGenerator {
    #[instrument(skip_all, fields(program = ?self.command.first()))]
    fn complete(&self, prompt: &str) -> Result<String, GeneratorUnavailable> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(GeneratorUnavailable::new("generator command is empty"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args);

        let input = format!("{}\n\n{}", self.prompts.system(), prompt);
        let output =
            run_command_with_timeout(cmd, Some(input.as_bytes()), self.timeout, self.output_limit_bytes)
                .map_err(|err| GeneratorUnavailable::new(format!("{program}: {err:#}")))?;

        if output.timed_out {
            return Err(GeneratorUnavailable::new(format!(
                "{program} timed out after {} seconds",
                self.timeout.as_secs()
            )));
        }
        if !output.status.success() {
            return Err(GeneratorUnavailable::new(format!(
                "{program} exited with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            )));
        }
        debug!(bytes = output.stdout.len(), "generator command finished");
        usable_code(&String::from_utf8_lossy(&output.stdout))
    }
}

impl CodeGenerator for CommandGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorUnavailable> {
        let prompt = self
            .prompts
            .render_generate(request)
            .map_err(|err| GeneratorUnavailable::new(format!("render prompt: {err:#}")))?;
        self.complete(&prompt)
    }

    fn repair(
        &self,
        request: &GenerationRequest,
        prior_code: &str,
        feedback: &Feedback,
    ) -> Result<String, GeneratorUnavailable> {
        let prompt = self
            .prompts
            .render_repair(request, prior_code, feedback)
            .map_err(|err| GeneratorUnavailable::new(format!("render prompt: {err:#}")))?;
        self.complete(&prompt)
    }
}

fn usable_code(raw: &str) -> Result<String, GeneratorUnavailable> {
    let code = strip_markdown_fences(raw);
    if code.trim().is_empty() {
        return Err(GeneratorUnavailable::new("generator returned empty code"));
    }
    Ok(code)
}

/// Extract code from a fenced block if the response has one.
pub fn strip_markdown_fences(raw: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("fence regex should be valid")
    });
    match FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => raw.trim().trim_matches('`').trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            schema_text: "DATA SCHEMA:".to_string(),
            rules_json: "{}".to_string(),
            input_path: PathBuf::from("in.csv"),
            output_path: PathBuf::from("out.csv"),
            category_column: "Status".to_string(),
            default_category: "Normal".to_string(),
            sentinel: "PROCESS_COMPLETE".to_string(),
        }
    }

    #[test]
    fn strips_language_fences() {
        let raw = "```python\nimport pandas as pd\nprint('PROCESS_COMPLETE')\n```\n";
        assert_eq!(
            strip_markdown_fences(raw),
            "import pandas as pd\nprint('PROCESS_COMPLETE')"
        );
    }

    #[test]
    fn keeps_unfenced_code_and_drops_surrounding_prose() {
        assert_eq!(strip_markdown_fences("  x = 1\n"), "x = 1");
        let raw = "Here you go:\n```\nx = 2\n```\nGood luck.";
        assert_eq!(strip_markdown_fences(raw), "x = 2");
    }

    #[test]
    fn empty_code_is_unavailable() {
        let err = usable_code("```python\n```").unwrap_err();
        assert!(err.reason.contains("empty code"));
    }

    #[test]
    fn missing_api_key_is_unavailable() {
        let generator = HttpGenerator::new(
            HttpConfig {
                api_key_env: "ENGINE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
                ..HttpConfig::default()
            },
            Duration::from_secs(1),
        )
        .expect("client");
        let err = generator.generate(&request()).unwrap_err();
        assert!(err.reason.contains("ENGINE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn unreachable_endpoint_is_unavailable() {
        // PATH is always set, so the request reaches the transport layer.
        let generator = HttpGenerator::new(
            HttpConfig {
                endpoint: "http://127.0.0.1:1/v1/chat/completions".to_string(),
                api_key_env: "PATH".to_string(),
                ..HttpConfig::default()
            },
            Duration::from_secs(2),
        )
        .expect("client");
        let err = generator.generate(&request()).unwrap_err();
        assert!(err.reason.contains("request failed"));
    }

    #[cfg(unix)]
    #[test]
    fn command_backend_reads_code_from_stdout() {
        let generator = CommandGenerator {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null; printf '```python\\nprint(1)\\n```\\n'".to_string(),
            ],
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
            prompts: PromptEngine::new(),
        };
        assert_eq!(generator.generate(&request()).expect("code"), "print(1)");
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_unavailable() {
        let generator = CommandGenerator {
            command: vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null; exit 3".to_string()],
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
            prompts: PromptEngine::new(),
        };
        let err = generator.generate(&request()).unwrap_err();
        assert!(err.reason.contains("exited with status Some(3)"));
    }
}
