//! Configuration management for RuleForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Explain pipeline tunables
    #[serde(default)]
    pub explain: ExplainConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom OpenAI-compatible endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Backend: qdrant, memory
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Qdrant gRPC URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Qdrant API key (sent as `api-key` header)
    pub api_key: Option<String>,

    /// Shared collection name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExplainConfig {
    /// Number of passages retrieved per topic
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Script chunk size in characters
    #[serde(default = "default_script_chunk_size")]
    pub script_chunk_size: usize,

    /// Maximum length of an outline section title
    #[serde(default = "default_section_title_max_chars")]
    pub section_title_max_chars: usize,

    /// Reading speed used for the completion estimate
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_store_backend() -> String { "qdrant".to_string() }
fn default_store_url() -> String { "http://localhost:6334".to_string() }
fn default_collection() -> String { crate::DEFAULT_COLLECTION.to_string() }
fn default_store_timeout() -> u64 { 10 }
fn default_top_k() -> usize { 5 }
fn default_script_chunk_size() -> usize { 200 }
fn default_section_title_max_chars() -> usize { 60 }
fn default_words_per_minute() -> usize { 200 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "ruleforge".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
            api_key: None,
            collection: default_collection(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            script_chunk_size: default_script_chunk_size(),
            section_title_max_chars: default_section_title_max_chars(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__VECTOR_STORE__URL=http://qdrant:6334
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline degenerate
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Message("embedding.dimension must be > 0".into()));
        }
        if self.explain.top_k == 0 {
            return Err(ConfigError::Message("explain.top_k must be > 0".into()));
        }
        if self.explain.script_chunk_size == 0 {
            return Err(ConfigError::Message("explain.script_chunk_size must be > 0".into()));
        }
        // Room for at least one character plus the ellipsis
        if self.explain.section_title_max_chars < 4 {
            return Err(ConfigError::Message(
                "explain.section_title_max_chars must be >= 4".into(),
            ));
        }
        if self.explain.words_per_minute == 0 {
            return Err(ConfigError::Message("explain.words_per_minute must be > 0".into()));
        }
        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.vector_store.collection, "rulebook_chunks");
        assert_eq!(config.explain.top_k, 5);
        assert_eq!(config.explain.script_chunk_size, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("explain.top_k", 3)
            .unwrap()
            .set_override("vector_store.backend", "memory")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.explain.top_k, 3);
        assert_eq!(config.explain.script_chunk_size, 200);
        assert_eq!(config.vector_store.backend, "memory");
        assert_eq!(config.vector_store.url, "http://localhost:6334");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = AppConfig::default();
        config.explain.script_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_titles() {
        let mut config = AppConfig::default();
        config.explain.section_title_max_chars = 3;
        assert!(config.validate().is_err());
    }
}
