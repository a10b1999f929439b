//! Configuration stored under `.parsegen/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::state::MAX_ATTEMPTS;

/// Top-level configuration (TOML).
///
/// Meant to be edited by humans. Missing fields default to values that
/// reproduce the reference behavior: three attempts, exact comparison, and a
/// Python program returning a dataframe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParsegenConfig {
    /// Ceiling on generation attempts per run.
    pub max_attempts: u32,

    /// Fold generation-service failures into the retry budget instead of aborting.
    pub retry_generation_errors: bool,

    /// Absolute epsilon for numeric cells. Absent means exact equality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_tolerance: Option<f64>,

    /// Directory holding `<target>/<target> sample.pdf` and `<target>/result.csv`.
    pub data_dir: String,

    /// Directory for per-target run reports.
    pub report_dir: String,

    /// Maximum prompt size before sections are dropped.
    pub prompt_budget_bytes: usize,

    /// Characters of the first page included in the prompt.
    pub excerpt_chars: usize,

    pub artifact: ArtifactConfig,
    pub execution: ExecutionConfig,
    pub excerpt: ExcerptConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: String,
    /// File extension of generated programs (without the dot).
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Command template. Placeholders: `{harness}`, `{artifact}`, `{entry_point}`, `{document}`.
    pub command: Vec<String>,
    /// Function the generated program must define.
    pub entry_point: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExcerptConfig {
    /// Command template printing document text to stdout (pages separated by form
    /// feeds). Placeholder: `{document}`. Empty reads the document as plain text.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Gemini `generateContent` over HTTPS.
    Gemini,
    /// Any command that reads a prompt on stdin and prints a program on stdout.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub kind: GeneratorKind,
    pub model: String,
    pub temperature: f32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Argv for `kind = "command"`.
    pub command: Vec<String>,
    /// Language the generated program is written in.
    pub language: String,
    /// Library guidance appended to the prompt contract.
    pub program_hint: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: "custom_parsers".to_string(),
            extension: "py".to_string(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command: ["python3", "-c", "{harness}", "{artifact}", "{entry_point}", "{document}"]
                .map(String::from)
                .to_vec(),
            entry_point: "parse".to_string(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 10_000_000,
        }
    }
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self {
            command: ["pdftotext", "-layout", "{document}", "-"]
                .map(String::from)
                .to_vec(),
            timeout_secs: 60,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Gemini,
            model: "gemini-2.5-pro".to_string(),
            temperature: 0.1,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 5 * 60,
            command: Vec::new(),
            language: "Python 3".to_string(),
            program_hint: "Read the PDF with PyPDF2 and return a pandas DataFrame.".to_string(),
        }
    }
}

impl Default for ParsegenConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_generation_errors: false,
            numeric_tolerance: None,
            data_dir: "data".to_string(),
            report_dir: ".parsegen/reports".to_string(),
            prompt_budget_bytes: 40_000,
            excerpt_chars: 1_000,
            artifact: ArtifactConfig::default(),
            execution: ExecutionConfig::default(),
            excerpt: ExcerptConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl ParsegenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if let Some(tolerance) = self.numeric_tolerance
            && !(tolerance.is_finite() && tolerance >= 0.0)
        {
            return Err(anyhow!("numeric_tolerance must be a finite number >= 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.artifact.dir.trim().is_empty() {
            return Err(anyhow!("artifact.dir must not be empty"));
        }
        if self.artifact.extension.trim().is_empty() || self.artifact.extension.contains('/') {
            return Err(anyhow!("artifact.extension must be a bare extension"));
        }
        if !has_program(&self.execution.command) {
            return Err(anyhow!("execution.command must be a non-empty array"));
        }
        if self.execution.entry_point.trim().is_empty() {
            return Err(anyhow!("execution.entry_point must not be empty"));
        }
        if self.execution.timeout_secs == 0 {
            return Err(anyhow!("execution.timeout_secs must be > 0"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.excerpt.timeout_secs == 0 {
            return Err(anyhow!("excerpt.timeout_secs must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.kind == GeneratorKind::Command && !has_program(&self.generator.command)
        {
            return Err(anyhow!(
                "generator.command must be a non-empty array when kind = \"command\""
            ));
        }
        Ok(())
    }
}

fn has_program(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ParsegenConfig::default()`.
pub fn load_config(path: &Path) -> Result<ParsegenConfig> {
    if !path.exists() {
        let cfg = ParsegenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ParsegenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ParsegenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
