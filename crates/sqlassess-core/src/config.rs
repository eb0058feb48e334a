use crate::errors::AssessError;
use crate::model::{KeyDetail, QuestionCounts};
use crate::providers::llm::fake::FakeRule;
use crate::providers::llm::ollama;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "sqlassess.yaml";
pub const DEFAULT_DATABASE: &str = ".sqlassess/assess.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessConfig {
    pub version: u32,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub settings: Settings,
}

impl Default for AssessConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            database: default_database(),
            provider: ProviderConfig::default(),
            settings: Settings::default(),
        }
    }
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Openai,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub fake: FakeProviderConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            fake: FakeProviderConfig::default(),
        }
    }
}

fn default_model() -> String {
    ollama::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FakeProviderConfig {
    #[serde(default)]
    pub rules: Vec<FakeRule>,
    #[serde(default)]
    pub default_response: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Concurrent grading calls per test.
    #[serde(default)]
    pub parallel: Option<usize>,
    /// Caller deadline for each completion call.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub question_counts: QuestionCounts,
    #[serde(default)]
    pub key_detail: KeyDetail,
}

impl Settings {
    pub fn parallelism(&self) -> usize {
        self.parallel.unwrap_or(4).max(1)
    }

    pub fn completion_deadline(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

pub fn load_config(path: &Path, strict: bool) -> Result<AssessConfig, AssessError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AssessError::Config(format!("failed to read config {}: {}", path.display(), e))
    })?;
    parse_config(&raw, strict)
        .map_err(|e| match e {
            AssessError::Config(msg) => {
                AssessError::Config(format!("{} (file: {})", msg, path.display()))
            }
            other => other,
        })
}

pub fn parse_config(raw: &str, strict: bool) -> Result<AssessConfig, AssessError> {
    let mut ignored_keys = BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let cfg: AssessConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| AssessError::Config(format!("failed to parse YAML: {}", e)))?;

    // YAML anchors and extension keys are allowed.
    let unknown: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !unknown.is_empty() {
        if strict {
            return Err(AssessError::Config(format!(
                "unknown fields in strict mode: {:?}",
                unknown
            )));
        }
        tracing::warn!(event = "config.unknown_fields", fields = ?unknown);
    }

    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(AssessError::Config(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.database.trim().is_empty() {
        return Err(AssessError::Config("database path is empty".into()));
    }
    if cfg.settings.question_counts.total() == 0 {
        return Err(AssessError::Config(
            "settings.question_counts must ask for at least one question".into(),
        ));
    }

    Ok(cfg)
}

pub const SAMPLE_CONFIG: &str = r#"version: 1
database: .sqlassess/assess.db
provider:
  kind: ollama            # ollama | openai | fake
  model: llama3
  base_url: http://127.0.0.1:11434
  temperature: 0.2
  max_tokens: 1024
  # api_key_env: OPENAI_API_KEY   # used by kind: openai
  # fake:                         # offline runs
  #   default_response: "Correct"
  #   rules:
  #     - contains: "Student Answer: SELECT"
  #       respond: "Correct"
settings:
  parallel: 4
  # timeout_seconds: 120
  key_detail: basic       # basic | extended
  question_counts:
    easy: 5
    medium: 5
    hard: 5
"#;

pub fn write_sample_config(path: &Path) -> Result<(), AssessError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| AssessError::Config(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
