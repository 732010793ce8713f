/// Configuration module for CryptoMentor.
///
/// Handles loading, validating, and providing default configuration values.
/// Secrets never live in the file: the API key is read from the environment.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable holding the OpenAI-compatible API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./okx_vectors.db".to_string()
}

fn default_raw_corpus_path() -> PathBuf {
    PathBuf::from("data/interim/okx_trading_guide_raw.csv")
}

fn default_processed_corpus_path() -> PathBuf {
    PathBuf::from("data/processed/okx_trading_guide_chunks.csv")
}

fn default_topics_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/topics.json"))
}

fn default_processed_json_path() -> PathBuf {
    PathBuf::from("data/processed/okx_trading_guide_chunks.json")
}

fn default_language() -> String {
    "ru".to_string()
}

fn default_chunk_max_tokens() -> usize {
    500
}

fn default_search_top_k() -> usize {
    8
}

fn default_max_context_tokens() -> usize {
    3000
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    64
}

fn default_bind() -> String {
    "0.0.0.0:7860".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Raw scraped articles (`id,title,url,content`).
    #[serde(default = "default_raw_corpus_path")]
    pub raw_corpus_path: PathBuf,

    /// Chunk records consumed by the indexer.
    #[serde(default = "default_processed_corpus_path")]
    pub processed_corpus_path: PathBuf,

    #[serde(default = "default_processed_json_path")]
    pub processed_json_path: PathBuf,

    /// JSON catalog of per-article description and primary tag. Articles
    /// without an entry fall back to their title.
    #[serde(default = "default_topics_path")]
    pub topics_path: Option<PathBuf>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Budget for query + selected documents.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Candidates below this cosine similarity are discarded before compression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f64>,

    /// Run the per-document compression pass before truncation.
    #[serde(default = "default_true")]
    pub compression: bool,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            raw_corpus_path: default_raw_corpus_path(),
            processed_corpus_path: default_processed_corpus_path(),
            processed_json_path: default_processed_json_path(),
            topics_path: default_topics_path(),
            language: default_language(),
            chunk_max_tokens: default_chunk_max_tokens(),
            search_top_k: default_search_top_k(),
            max_context_tokens: default_max_context_tokens(),
            score_threshold: None,
            compression: default_true(),
            openai: OpenAiConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path only.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_max_tokens > 0, "chunk_max_tokens must be positive");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.max_context_tokens > 0,
            "max_context_tokens must be positive"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive"
        );
        anyhow::ensure!(
            !self.language.trim().is_empty(),
            "language must not be empty"
        );
        if let Some(threshold) = self.score_threshold {
            anyhow::ensure!(
                (-1.0..=1.0).contains(&threshold),
                "score_threshold must be within [-1, 1]"
            );
        }
        Ok(())
    }

    /// Read the API key from the environment (a `.env` file is honoured by the binary).
    pub fn api_key(&self) -> Result<String> {
        let key = std::env::var(API_KEY_ENV)
            .with_context(|| format!("{API_KEY_ENV} is not set"))?;
        anyhow::ensure!(!key.trim().is_empty(), "{API_KEY_ENV} is empty");
        Ok(key)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_max_tokens, 500);
        assert_eq!(config.search_top_k, 8);
        assert_eq!(config.max_context_tokens, 3000);
        assert_eq!(config.language, "ru");
        assert_eq!(config.openai.chat_model, "gpt-3.5-turbo");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimensions, 1536);
        assert!(config.compression);
        assert!(config.score_threshold.is_none());
        assert_eq!(config.topics_path, Some(PathBuf::from("data/topics.json")));
    }

    #[test]
    fn test_topics_path_defaults_when_omitted() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.topics_path, Some(PathBuf::from("data/topics.json")));

        let config: Config = serde_json::from_str(r#"{"topics_path": null}"#).unwrap();
        assert!(config.topics_path.is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_max_tokens": 300, "db_path": "./test.db", "embedding": {"dimensions": 256}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_max_tokens, 300);
        assert_eq!(config.db_path, "./test.db");
        assert_eq!(config.embedding.dimensions, 256);
        // Other fields keep their defaults
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.search_top_k, 8);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_budget() {
        let mut config = Config::default();
        config.max_context_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_threshold() {
        let mut config = Config::default();
        config.score_threshold = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_custom_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.search_top_k, 8);
        assert!(!path.exists(), "template is only written for the default path");
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_max_tokens, 500);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.topics_path = Some(PathBuf::from("data/topics.json"));
        config.save(path.to_str().unwrap()).unwrap();

        let parsed = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(parsed.topics_path, config.topics_path);
        assert_eq!(parsed.db_path, config.db_path);
    }
}
