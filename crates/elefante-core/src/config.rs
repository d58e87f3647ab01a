//! Engine Configuration
//!
//! Resolved once at startup from environment variables with
//! platform-appropriate defaults. `ELEFANTE_CONFIG_PATH` may point at a JSON
//! file whose fields override the defaults; individual env vars win over
//! both.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngineError, Result};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default lock acquire timeout (seconds)
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Locks older than this are considered stale (seconds)
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Default embedding dimension for the built-in hash embedder
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Query-embedding LRU cache capacity
pub const DEFAULT_EMBEDDING_CACHE_SIZE: usize = 512;

/// Semantic weight when blending with temporal decay
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

/// Temporal weight when blending with temporal decay
pub const DEFAULT_TEMPORAL_WEIGHT: f32 = 0.3;

// ============================================================================
// CONFIG
// ============================================================================

/// Temporal decay blend weights for vector search
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemporalDecayConfig {
    pub enabled: bool,
    pub semantic_weight: f32,
    pub temporal_weight: f32,
}

impl Default for TemporalDecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            temporal_weight: DEFAULT_TEMPORAL_WEIGHT,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root data directory (default `~/.elefante`)
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. `info`, `elefante=debug`)
    pub log_level: String,
    /// Whether test-namespace memories may be persisted
    pub allow_test_memories: bool,
    /// Lock acquire timeout (seconds)
    pub acquire_timeout_secs: u64,
    /// Stale-lock threshold (seconds)
    pub lock_timeout_secs: u64,
    /// Embedding dimension for the built-in embedder
    pub embedding_dimensions: usize,
    /// Query-embedding cache capacity
    pub embedding_cache_size: usize,
    /// Temporal decay blending
    pub temporal_decay: TemporalDecayConfig,
    /// Topology owner id stamped by the classifier
    pub owner_id: String,
    /// Display name of the user entity for first-person auto-linking
    pub user_name: String,
}

/// Optional JSON override file shape (`ELEFANTE_CONFIG_PATH`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    allow_test_memories: Option<bool>,
    acquire_timeout_secs: Option<u64>,
    lock_timeout_secs: Option<u64>,
    embedding_dimensions: Option<usize>,
    temporal_decay: Option<TemporalDecayConfig>,
    owner_id: Option<String>,
    user_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            allow_test_memories: false,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            embedding_cache_size: DEFAULT_EMBEDDING_CACHE_SIZE,
            temporal_decay: TemporalDecayConfig::default(),
            owner_id: "owner-jay".to_string(),
            user_name: "Jay".to_string(),
        }
    }
}

impl EngineConfig {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("ELEFANTE_CONFIG_PATH") {
            if !path.is_empty() {
                config.apply_file(Path::new(&path))?;
            }
        }

        if let Ok(dir) = std::env::var("ELEFANTE_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(level) = std::env::var("ELEFANTE_LOG_LEVEL") {
            if !level.is_empty() {
                config.log_level = level;
            }
        }
        if let Ok(flag) = std::env::var("ELEFANTE_ALLOW_TEST_MEMORIES") {
            config.allow_test_memories = is_truthy(&flag);
        }

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidInput(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|e| {
            EngineError::InvalidInput(format!("Bad config file {}: {}", path.display(), e))
        })?;

        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.allow_test_memories {
            self.allow_test_memories = v;
        }
        if let Some(v) = file.acquire_timeout_secs {
            self.acquire_timeout_secs = v;
        }
        if let Some(v) = file.lock_timeout_secs {
            self.lock_timeout_secs = v;
        }
        if let Some(v) = file.embedding_dimensions {
            self.embedding_dimensions = v;
        }
        if let Some(v) = file.temporal_decay {
            self.temporal_decay = v;
        }
        if let Some(v) = file.owner_id {
            self.owner_id = v;
        }
        if let Some(v) = file.user_name {
            self.user_name = v;
        }
        Ok(())
    }

    /// Create a config rooted at an explicit data directory (tests, CLI).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    // ========== Persisted layout ==========

    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir.join("data").join("chroma").join("memories.db")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join("data").join("kuzu_db").join("graph.db")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("data").join("dashboard_snapshot.json")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }

    pub fn write_lock_path(&self) -> PathBuf {
        self.locks_dir().join("write.lock")
    }

    pub fn master_lock_path(&self) -> PathBuf {
        self.locks_dir().join("elefante.lock")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Create every directory the engine persists into.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.vector_db_path().parent().map(Path::to_path_buf),
            self.graph_db_path().parent().map(Path::to_path_buf),
            Some(self.locks_dir()),
            Some(self.logs_dir()),
        ]
        .into_iter()
        .flatten()
        {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(base) = directories::BaseDirs::new() {
        return base.home_dir().join(".elefante");
    }
    PathBuf::from(".elefante")
}

/// Truthy parse for boolean env vars: `1/true/yes/on`.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// TESTS
// ============================================================================
