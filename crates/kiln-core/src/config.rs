//! kiln.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Default redb file holding the state snapshot.
pub const DEFAULT_CACHE_FILE: &str = "state.redb";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the state snapshot.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// File name of the snapshot database inside `dir`.
    #[serde(default = "default_cache_file")]
    pub file: String,
    /// What to do when the snapshot exists but cannot be decoded.
    #[serde(default)]
    pub on_corrupt: CorruptCachePolicy,
    /// Extra top-level fields dropped from old snapshots on load.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsolete_fields: Vec<String>,
}

/// Behaviour of rehydration when the persisted snapshot is unreadable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptCachePolicy {
    /// Log and start from an empty state.
    #[default]
    Degrade,
    /// Refuse to start.
    Fail,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: default_cache_dir(),
            file: default_cache_file(),
            on_corrupt: CorruptCachePolicy::default(),
            obsolete_fields: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Full path of the snapshot database.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

impl KilnConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: KilnConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a kiln.toml pointing at the given cache directory.
    pub fn scaffold(cache_dir: &str) -> Self {
        KilnConfig {
            cache: CacheConfig {
                dir: PathBuf::from(cache_dir),
                ..CacheConfig::default()
            },
        }
    }
}
