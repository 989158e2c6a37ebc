use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GreenroomError, Result};

/// Top-level configuration for the Greenroom engine.
///
/// Loaded from `~/.greenroom/config.toml` by default. Each section corresponds
/// to one stage of the retrieval core or a cross-cutting concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreenroomConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for GreenroomConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl GreenroomConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GreenroomConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| GreenroomError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Verbose debug logging of retrieval decisions.
    pub debug: bool,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier.
    pub model: String,
    /// Embedding vector dimension.
    pub dim: usize,
    /// Remote embedding endpoint. Empty string means the deterministic
    /// in-process embedder is used.
    pub endpoint: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dim: 384,
            endpoint: String::new(),
        }
    }
}

/// Document chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Retrieval and context-selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned per retrieval.
    pub k: usize,
    /// Over-fetch pool size for diversity re-ranking.
    pub fetch_k: usize,
    /// Relevance/diversity trade-off (1.0 = pure relevance, 0.0 = pure diversity).
    pub diversity_weight: f32,
    /// Maximum times one chunk may be selected as context within a session.
    pub usage_ceiling: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            fetch_k: 40,
            diversity_weight: 0.5,
            usage_ceiling: 1,
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Remote index endpoint, e.g. `http://localhost:6333`. Empty string means
    /// the in-process index is used.
    pub endpoint: String,
    /// Collection name for indexed chunks.
    pub collection: String,
    /// HTTP request timeout in seconds for the remote index.
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            collection: "interview_chunks".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity window in minutes for role-only chat sessions (lazy expiry).
    pub inactivity_minutes: u32,
    /// Default chunk age in minutes before the reaper purges a session.
    pub reap_after_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: 20,
            reap_after_minutes: 30,
        }
    }
}
