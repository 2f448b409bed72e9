//! Configuration for promptchain.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (LLM_API_KEY, LLM_BASE_URL, LLM_DEFAULT_MODEL,
//!    CALENDAR_ACCESS_TOKEN)
//! 2. Config file (.promptchain/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - $PROMPTCHAIN_CONFIG if set
//! - Searches current directory and parents for .promptchain/config.yaml
//! - Falls back to ~/.promptchain/config.yaml
//! - Paths in config file are relative to the config file's directory
//!
//! The resolved configuration is a plain value handed to constructors;
//! nothing is cached process-wide.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{CalendarConfig, OpenAiConfig, WeatherConfig};
use crate::core::PipelineSettings;

const CONFIG_DIR: &str = ".promptchain";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,

    /// Completion provider connection
    #[serde(default)]
    pub llm: OpenAiConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    /// Knowledge base JSON file (relative to the config file)
    #[serde(default)]
    pub knowledge_base: Option<String>,
}

/// Values taken from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub calendar_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build overrides from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            base_url: get("LLM_BASE_URL"),
            model: get("LLM_DEFAULT_MODEL"),
            calendar_token: get("CALENDAR_ACCESS_TOKEN"),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub llm: OpenAiConfig,
    pub pipeline: PipelineSettings,
    pub calendar: CalendarConfig,
    pub weather: WeatherConfig,

    /// Absolute path to the knowledge base file (if configured)
    pub knowledge_base: Option<PathBuf>,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Human-readable summary with secrets redacted
    pub fn describe(&self) -> String {
        let secret = |set: bool| if set { "set" } else { "not set" };

        let mut lines = vec![
            format!(
                "config file:     {}",
                self.config_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            ),
            format!("llm base url:    {}", self.llm.base_url),
            format!("llm api key:     {}", secret(!self.llm.api_key.is_empty())),
            format!("model:           {}", self.pipeline.model),
            format!("gate threshold:  {}", self.pipeline.gate_threshold),
            format!("time zone:       {}", self.pipeline.time_zone),
            format!("calendar:        {}", self.calendar.calendar_id),
            format!(
                "calendar token:  {}",
                secret(self.calendar.access_token.is_some())
            ),
            format!("weather api:     {}", self.weather.base_url),
        ];
        lines.push(format!(
            "knowledge base:  {}",
            self.knowledge_base
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        ));

        lines.join("\n")
    }
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Locate the config file using the documented search order
pub fn discover_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("PROMPTCHAIN_CONFIG") {
        return Some(PathBuf::from(explicit));
    }

    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd))
    {
        return Some(found);
    }

    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed file, its location and the environment
pub fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env: &EnvOverrides,
) -> Result<ResolvedConfig> {
    let ConfigFile {
        mut llm,
        mut pipeline,
        mut calendar,
        weather,
        knowledge_base,
        ..
    } = file;

    if let Some(ref key) = env.api_key {
        llm.api_key = key.clone();
    }
    if let Some(ref url) = env.base_url {
        llm.base_url = url.clone();
    }
    if let Some(ref model) = env.model {
        pipeline.model = model.clone();
    }
    if let Some(ref token) = env.calendar_token {
        calendar.access_token = Some(token.clone());
    }

    // Events are written in the zone the pipeline resolves times in
    calendar.time_zone = pipeline.time_zone.clone();

    pipeline
        .validate()
        .context("Invalid pipeline configuration")?;

    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let knowledge_base = knowledge_base.map(|p| resolve_path(&base_dir, &p));

    Ok(ResolvedConfig {
        llm,
        pipeline,
        calendar,
        weather,
        knowledge_base,
        config_file,
    })
}

/// Load configuration from `path`, or discover it when `None`
pub fn load_config_from(path: Option<&Path>) -> Result<ResolvedConfig> {
    let config_file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config_file(),
    };

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(file, config_file, &EnvOverrides::from_env())
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    load_config_from(None)
}
