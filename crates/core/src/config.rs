//! Configuration management for ragstep.
//!
//! Configuration is merged from, in increasing precedence:
//! - Built-in defaults
//! - The config file (`.ragstep/config.yaml` or `RAGSTEP_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)
//!
//! All state lives under the workspace's `.ragstep/` directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

const KNOWN_LLM_PROVIDERS: [&str; 3] = ["ollama", "openai", "groq"];
const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "mock"];
const KNOWN_INDEX_BACKENDS: [&str; 2] = ["lancedb", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragstep/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Answer-generation model settings
    pub llm: LlmSettings,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Vector index settings
    pub index: IndexSettings,

    /// Document chunking settings
    pub chunking: ChunkingSettings,

    /// Step orchestration settings
    pub workflow: WorkflowSettings,
}

/// Answer-generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Provider name: "ollama", "openai" or "groq"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Custom endpoint (base URL)
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Maximum completion tokens
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "mock"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Vector dimension produced by the model
    pub dimensions: usize,

    /// Custom endpoint (base URL)
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            endpoint: None,
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Backend name: "lancedb" or "memory"
    pub backend: String,

    /// Index directory (defaults to `.ragstep/index`)
    pub path: Option<PathBuf>,

    /// Table/collection name
    pub table: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: "lancedb".to_string(),
            path: None,
            table: "chunks".to_string(),
        }
    }
}

/// Document chunking settings (characters).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Step orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSettings {
    /// Attempts per step before the run fails
    pub max_attempts: u32,

    /// Backoff before the second attempt
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff
    pub max_backoff_ms: u64,

    /// SQLite step store (defaults to `.ragstep/steps.sqlite`)
    pub store_path: Option<PathBuf>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            store_path: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    chunking: Option<ChunkingSettings>,
    workflow: Option<WorkflowSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            chunking: ChunkingSettings::default(),
            workflow: WorkflowSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RAGSTEP_WORKSPACE`: Override workspace path
    /// - `RAGSTEP_CONFIG`: Path to config file
    /// - `RAGSTEP_LLM_PROVIDER`, `RAGSTEP_LLM_MODEL`: Generation model
    /// - `RAGSTEP_EMBEDDING_PROVIDER`: Embedding provider
    /// - `RAGSTEP_INDEX_BACKEND`: Vector index backend
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ragstep_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGSTEP_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGSTEP_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.ragstep_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        if let Ok(provider) = std::env::var("RAGSTEP_LLM_PROVIDER") {
            config.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGSTEP_LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(provider) = std::env::var("RAGSTEP_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        if let Ok(backend) = std::env::var("RAGSTEP_INDEX_BACKEND") {
            config.index.backend = backend;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }
        if let Some(chunking) = config_file.chunking {
            result.chunking = chunking;
        }
        if let Some(workflow) = config_file.workflow {
            result.workflow = workflow;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file. A new config file re-merges on top of the current state.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> AppResult<Self> {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            if config_file.exists() {
                self = self.merge_yaml(&config_file)?;
            }
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        Ok(self)
    }

    /// Get the path to the .ragstep directory.
    pub fn ragstep_dir(&self) -> PathBuf {
        self.workspace.join(".ragstep")
    }

    /// Ensure the .ragstep directory exists.
    pub fn ensure_ragstep_dir(&self) -> AppResult<()> {
        let dir = self.ragstep_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragstep directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Directory of the on-disk vector index.
    pub fn index_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.ragstep_dir().join("index"))
    }

    /// Location of the durable step store.
    pub fn step_store_path(&self) -> PathBuf {
        self.workflow
            .store_path
            .clone()
            .unwrap_or_else(|| self.ragstep_dir().join("steps.sqlite"))
    }

    /// Resolve the generation API key.
    ///
    /// `RAGSTEP_API_KEY` wins over the provider's configured `apiKeyEnv`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("RAGSTEP_API_KEY") {
            return Some(key);
        }

        let env_var = match self.llm.api_key_env {
            Some(ref name) => name.clone(),
            None => match self.llm.provider.as_str() {
                "openai" => "OPENAI_API_KEY".to_string(),
                "groq" => "GROQ_API_KEY".to_string(),
                _ => return None,
            },
        };

        std::env::var(env_var).ok()
    }

    /// Validate provider names and numeric settings.
    pub fn validate(&self) -> AppResult<()> {
        check_known("LLM provider", &self.llm.provider, &KNOWN_LLM_PROVIDERS)?;
        check_known(
            "embedding provider",
            &self.embedding.provider,
            &KNOWN_EMBEDDING_PROVIDERS,
        )?;
        check_known("index backend", &self.index.backend, &KNOWN_INDEX_BACKENDS)?;

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(AppError::Config(format!(
                "Invalid chunking: size {} must be positive and larger than overlap {}",
                self.chunking.chunk_size, self.chunking.chunk_overlap
            )));
        }

        if self.workflow.max_attempts == 0 {
            return Err(AppError::Config(
                "workflow.maxAttempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_known(what: &str, value: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Unknown {}: {}. Supported: {}",
            what,
            value,
            known.join(", ")
        )))
    }
}
