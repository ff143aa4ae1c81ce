//! Configuration for the chunkmill pipeline.

use crate::error::PipelineError;
use crate::inference::CallConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration, loaded once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Inference backend configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Opaque per-call overrides (temperature, max_tokens, ...), passed
    /// through unmodified to the inference backend
    #[serde(default)]
    pub call_config: CallConfig,
}

/// Source text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the text to process
    #[serde(default = "default_input_path")]
    pub path: PathBuf,

    /// Optional file holding the system directive placed in front of every unit
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: default_input_path(),
            system_prompt_path: default_system_prompt_path(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination of the reassembled document
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Optional JSON report with per-unit status and failed indices
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            report_path: None,
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of inference calls in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Sentences per unit
    #[serde(default = "default_unit_size")]
    pub unit_size: usize,

    /// Delay a slot is held after its call returns, in milliseconds
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    /// Upper bound on a single inference call, in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Time in-flight calls may still finish after cancellation, in seconds
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,

    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Enable periodic progress reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after the run completes
    #[serde(default)]
    pub metrics_output_path: Option<PathBuf>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            unit_size: default_unit_size(),
            pacing_delay_ms: default_pacing_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            worker_threads: None,
            enable_metrics: true,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

/// Which inference backend serves the calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint
    ChatCompletions,
    /// Returns each unit unchanged; no network
    Echo,
}

/// Inference backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Base URL of the API, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model selector, opaque to the pipeline
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// The settings the pipeline core consumes. Validated once at pipeline start
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_concurrent: usize,
    pub unit_size: usize,
    pub pacing_delay: Duration,
    pub call_timeout: Duration,
    pub cancel_grace: Duration,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrent == 0 {
            return Err(PipelineError::Config("max_concurrent must be > 0".into()));
        }
        if self.unit_size == 0 {
            return Err(PipelineError::Config("unit_size must be > 0".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(PipelineError::Config("call timeout must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        ProcessingConfig::default().pipeline_config()
    }
}

impl ProcessingConfig {
    /// Project the core pipeline settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_concurrent: self.max_concurrent,
            unit_size: self.unit_size,
            pacing_delay: Duration::from_millis(self.pacing_delay_ms),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            cancel_grace: Duration::from_secs(self.cancel_grace_secs),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Core pipeline settings derived from `processing`.
    pub fn pipeline_config(&self) -> PipelineConfig {
        self.processing.pipeline_config()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline_config().validate()?;

        if self.provider.kind == ProviderKind::ChatCompletions {
            if self.provider.model.trim().is_empty() {
                return Err(PipelineError::Config("provider.model must not be empty".into()));
            }
            if self.provider.base_url.trim().is_empty() {
                return Err(PipelineError::Config("provider.base_url must not be empty".into()));
            }
        }
        if self.processing.enable_metrics && self.processing.metrics_interval_secs == 0 {
            return Err(PipelineError::Config("metrics_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_input_path() -> PathBuf { PathBuf::from("content.txt") }
fn default_system_prompt_path() -> Option<PathBuf> { Some(PathBuf::from("system_prompt.txt")) }
fn default_output_path() -> PathBuf { PathBuf::from("output.txt") }
fn default_max_concurrent() -> usize { 5 }
fn default_unit_size() -> usize { 5 }
fn default_pacing_delay_ms() -> u64 { 100 }
fn default_call_timeout_secs() -> u64 { 300 }
fn default_cancel_grace_secs() -> u64 { 5 }
fn default_true() -> bool { true }
fn default_metrics_interval() -> u64 { 10 }
fn default_provider_kind() -> ProviderKind { ProviderKind::ChatCompletions }
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_request_timeout_secs() -> u64 { 180 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_processing_config() {
        let processing = ProcessingConfig::default();
        assert_eq!(processing.max_concurrent, 5);
        assert_eq!(processing.unit_size, 5);
        assert_eq!(processing.pacing_delay_ms, 100);
        assert!(processing.enable_metrics);
        assert!(processing.metrics_output_path.is_none());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.processing.max_concurrent, 5);
        assert_eq!(config.provider.kind, ProviderKind::ChatCompletions);
        assert_eq!(config.input.path, PathBuf::from("content.txt"));
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
processing:
  max_concurrent: 30
  unit_size: 2
provider:
  kind: echo
call_config:
  temperature: 0.2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.processing.max_concurrent, 30);
        assert_eq!(config.processing.unit_size, 2);
        assert_eq!(config.provider.kind, ProviderKind::Echo);
        assert_eq!(
            config.call_config.get("temperature"),
            Some(&serde_json::json!(0.2))
        );
    }

    #[test]
    fn test_json_config() {
        let config =
            Config::from_json(r#"{"processing": {"max_concurrent": 3}}"#).unwrap();
        assert_eq!(config.processing.max_concurrent, 3);
        assert_eq!(config.processing.unit_size, 5);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.processing.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zero_unit_size() {
        let mut config = Config::default();
        config.processing.unit_size = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_empty_model() {
        let mut config = Config::default();
        config.provider.model = "  ".to_string();
        assert!(config.validate().is_err());

        config.provider.kind = ProviderKind::Echo;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_projection() {
        let mut processing = ProcessingConfig::default();
        processing.pacing_delay_ms = 250;
        processing.call_timeout_secs = 12;

        let pipeline = processing.pipeline_config();
        assert_eq!(pipeline.pacing_delay, Duration::from_millis(250));
        assert_eq!(pipeline.call_timeout, Duration::from_secs(12));
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_keeps_call_config() {
        let mut config = Config::default();
        config.call_config.set("max_tokens", serde_json::json!(128));
        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.call_config.get("max_tokens"), Some(&serde_json::json!(128)));
    }
}
