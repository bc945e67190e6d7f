//! Engine configuration stored in `engine.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// loop was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Generation calls allowed per engine run.
    pub max_attempts: u32,

    /// Wall-clock budget for one candidate execution.
    pub execution_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Marker a candidate must print on stdout to count as completed.
    pub sentinel: String,

    /// Program (plus leading args) used to run candidate code.
    pub interpreter: Vec<String>,

    pub table: TableConfig,
    pub generator: GeneratorConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableConfig {
    pub category_column: String,
    /// Baseline category; every other category counts as a violation.
    pub default_category: String,
    /// Columns aggregated per category in the summary. Empty means every
    /// numeric column.
    pub value_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorBackend {
    Http,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    pub timeout_secs: u64,
    /// Command backend argv. The prompt is written to its stdin.
    pub command: Vec<String>,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Candidate code and per-attempt archives.
    pub work_dir: PathBuf,
    pub verified_dir: PathBuf,
    pub default_slot: String,
    pub classified: PathBuf,
    pub violations: PathBuf,
    pub summary: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            execution_timeout_secs: 30,
            output_limit_bytes: 100_000,
            sentinel: "PROCESS_COMPLETE".to_string(),
            interpreter: vec!["python3".to_string()],
            table: TableConfig::default(),
            generator: GeneratorConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            category_column: "Status".to_string(),
            default_category: "Normal".to_string(),
            value_columns: Vec::new(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Http,
            timeout_secs: 60,
            command: Vec::new(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cerebras.ai/v1/chat/completions".to_string(),
            model: "gpt-oss-120b".to_string(),
            api_key_env: "CEREBRAS_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".engine/work"),
            verified_dir: PathBuf::from(".engine/verified"),
            default_slot: "current".to_string(),
            classified: PathBuf::from("classified_output.csv"),
            violations: PathBuf::from("violations.csv"),
            summary: PathBuf::from("summary.json"),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.execution_timeout_secs == 0 {
            return Err(anyhow!("execution_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.sentinel.trim().is_empty() {
            return Err(anyhow!("sentinel must be non-empty"));
        }
        if self.interpreter.is_empty() || self.interpreter[0].trim().is_empty() {
            return Err(anyhow!("interpreter must be a non-empty array"));
        }
        if self.table.category_column.trim().is_empty() {
            return Err(anyhow!("table.category_column must be non-empty"));
        }
        if self.table.default_category.trim().is_empty() {
            return Err(anyhow!("table.default_category must be non-empty"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        match self.generator.backend {
            GeneratorBackend::Command => {
                if self.generator.command.is_empty()
                    || self.generator.command[0].trim().is_empty()
                {
                    return Err(anyhow!(
                        "generator.command must be a non-empty array for the command backend"
                    ));
                }
            }
            GeneratorBackend::Http => {
                if self.generator.http.endpoint.trim().is_empty() {
                    return Err(anyhow!("generator.http.endpoint must be non-empty"));
                }
                if self.generator.http.max_tokens == 0 {
                    return Err(anyhow!("generator.http.max_tokens must be > 0"));
                }
            }
        }
        validate_slot(&self.paths.default_slot)?;
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator.timeout_secs)
    }
}

/// Slot names become file names in the verified directory.
pub fn validate_slot(slot: &str) -> Result<()> {
    let ok = !slot.is_empty()
        && slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !slot.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(anyhow!(
            "invalid slot name '{slot}' (use letters, digits, '-', '_', '.')"
        ))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::fs_util::write_atomic(path, buf.as_bytes())
}
