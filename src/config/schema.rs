use crate::llm::types::ModelConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// SQLite database file. Relative paths resolve against the workspace.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Conversation log directory (default: `<workspace>/logs/llm`)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prompt YAML directory (default: `<workspace>/prompts`)
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// Model catalog referenced by name from `[[users]]`.
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_database_file() -> String {
    "songsmith.db".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            database_file: default_database_file(),
            log_dir: None,
            prompts_dir: None,
            gateway: GatewayConfig::default(),
            completion: CompletionConfig::default(),
            summarization: SummarizationConfig::default(),
            models: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        let file = PathBuf::from(&self.database_file);
        if file.is_absolute() {
            file
        } else {
            self.workspace_dir.join(file)
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join("logs").join("llm"))
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.prompts_dir
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join("prompts"))
    }

    pub fn find_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|model| model.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Maximum request body size in bytes (default: 64KB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Time allowed to produce response headers (default: 30s)
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_max_body_bytes() -> usize {
    65_536
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Total timeout for one completion call, body included (default: 300s)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Base URL for the local inference provider. `OLLAMA_API_BASE` wins.
    #[serde(default)]
    pub ollama_base_url: Option<String>,
    /// Per-provider base URL overrides keyed by provider name.
    #[serde(default)]
    pub base_urls: BTreeMap<String, String>,
    /// NDJSON lines buffered between the generation task and the HTTP body.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_stream_buffer() -> usize {
    32
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ollama_base_url: None,
            base_urls: BTreeMap::new(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    /// Token budget = multiplier × effective max tokens, unless the model
    /// declares `context_window_tokens`.
    #[serde(default = "default_budget_multiplier")]
    pub budget_multiplier: u64,
    #[serde(default = "default_summary_max_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_summary_temperature")]
    pub temperature: f64,
}

fn default_budget_multiplier() -> u64 {
    1024
}

fn default_summary_max_tokens() -> u32 {
    1000
}

fn default_summary_temperature() -> f64 {
    0.1
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            budget_multiplier: default_budget_multiplier(),
            max_output_tokens: default_summary_max_tokens(),
            temperature: default_summary_temperature(),
        }
    }
}

/// One account allowed through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    /// Bearer token presented as `Authorization: Bearer <token>`
    pub token: String,
    /// Name of the generation model in `[[models]]`
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the summarization model in `[[models]]`
    #[serde(default)]
    pub summarization_model: Option<String>,
    /// Per-user output ceiling, clamped against the model's own maximum
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Provider name → API key
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
    #[serde(default)]
    pub include_themes: String,
    #[serde(default)]
    pub exclude_themes: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ProviderKind;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database_file, "songsmith.db");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.completion.request_timeout_secs, 300);
        assert_eq!(config.summarization.budget_multiplier, 1024);
        assert!(config.models.is_empty());
    }

    #[test]
    fn parses_models_and_users() {
        let raw = r#"
            [[models]]
            name = "gpt-4o-mini"
            provider = "openai"
            max_tokens = 4096

            [[models]]
            name = "o3-mini"
            provider = "openai"
            supports_temperature = false

            [[users]]
            id = "alice"
            token = "tok-alice"
            model = "gpt-4o-mini"
            max_tokens = 2048
            api_keys = { openai = "sk-alice" }
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        let model = config.find_model("gpt-4o-mini").unwrap();
        assert_eq!(model.provider, ProviderKind::OpenAi);
        assert!(model.supports_temperature);
        assert!(!config.find_model("o3-mini").unwrap().supports_temperature);
        assert_eq!(config.users[0].api_keys["openai"], "sk-alice");
    }

    #[test]
    fn relative_database_resolves_against_workspace() {
        let config = Config {
            workspace_dir: PathBuf::from("/srv/songsmith"),
            ..Config::default()
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/songsmith/songsmith.db")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/srv/songsmith/logs/llm"));
    }
}
