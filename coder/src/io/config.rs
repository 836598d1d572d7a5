//! Coder configuration stored in `coder.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::protocol::ProtocolKind;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "coder.toml";

/// Environment variable overriding `completion.base_url`.
pub const ENV_SERVER_ADDRESS: &str = "OLLAMA_SERVER_ADDRESS";
/// Environment variable overriding `completion.model`.
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";

/// Coder configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoderConfig {
    /// Maximum number of generate → verify → review iterations per run.
    pub max_cycles: u32,

    /// Generated artifacts shorter than this (in characters) count as failed generations.
    pub min_artifact_chars: usize,

    /// Wall-clock budget for a whole run in seconds.
    pub run_timeout_secs: u64,

    /// Grammar used to read verifier and reviewer responses.
    pub protocol: ProtocolKind,

    pub completion: CompletionConfig,

    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of the Ollama server.
    pub base_url: String,
    pub model: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Optional system prompt sent with every request.
    pub system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// When false, an approved artifact ends the run without being executed.
    pub enabled: bool,
    /// Interpreter binary (resolved through `PATH`).
    pub interpreter: String,
    /// Extra interpreter arguments placed before the script path.
    pub args: Vec<String>,
    /// File name the artifact is written to inside the scratch directory.
    pub script_name: String,
    pub timeout_secs: u64,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:latest".to_string(),
            request_timeout_secs: 120,
            system: None,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: "python3".to_string(),
            args: Vec::new(),
            script_name: "main.py".to_string(),
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            max_cycles: 3,
            min_artifact_chars: 10,
            run_timeout_secs: 10 * 60,
            protocol: ProtocolKind::Keyword,
            completion: CompletionConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl CoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.completion.base_url.trim().is_empty() {
            return Err(anyhow!("completion.base_url must be non-empty"));
        }
        if self.completion.model.trim().is_empty() {
            return Err(anyhow!("completion.model must be non-empty"));
        }
        if self.completion.request_timeout_secs == 0 {
            return Err(anyhow!("completion.request_timeout_secs must be > 0"));
        }
        if self.sandbox.interpreter.trim().is_empty() {
            return Err(anyhow!("sandbox.interpreter must be non-empty"));
        }
        let script = Path::new(&self.sandbox.script_name);
        if self.sandbox.script_name.trim().is_empty()
            || script.components().count() != 1
            || script.file_name().is_none()
        {
            return Err(anyhow!("sandbox.script_name must be a plain file name"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Apply `OLLAMA_SERVER_ADDRESS` / `MODEL_NAME` overrides from a lookup function.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_SERVER_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.completion.base_url = addr;
        }
        if let Some(model) = lookup(ENV_MODEL_NAME).filter(|v| !v.trim().is_empty()) {
            self.completion.model = model;
        }
    }
}

/// Load config from a TOML file and apply process environment overrides.
///
/// If the file is missing, starts from `CoderConfig::default()`.
pub fn load_config(path: &Path) -> Result<CoderConfig> {
    let mut cfg = read_config_file(path)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<CoderConfig> {
    if !path.exists() {
        return Ok(CoderConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CoderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CoderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
