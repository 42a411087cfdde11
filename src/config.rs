use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;
pub const DEFAULT_SNIFF_BYTES: usize = 8 * 1024;
pub const DEFAULT_FILE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Run settings. Loaded from TOML (camelCase keys); missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub workers: usize,
    pub max_file_size: u64,
    pub sniff_bytes: usize,
    pub file_timeout_secs: u64,
    /// Defaults to `<output>/.cache`.
    pub cache_dir: Option<PathBuf>,
    pub cache_capacity: usize,
    pub use_cache: bool,
    pub ignore_dirs: Vec<String>,
    pub follow_links: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sniff_bytes: DEFAULT_SNIFF_BYTES,
            file_timeout_secs: DEFAULT_FILE_TIMEOUT_SECS,
            cache_dir: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            use_cache: true,
            ignore_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
            ],
            follow_links: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = [
            ("workers", self.workers as u64),
            ("maxFileSize", self.max_file_size),
            ("sniffBytes", self.sniff_bytes as u64),
            ("fileTimeoutSecs", self.file_timeout_secs),
            ("cacheCapacity", self.cache_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PipelineError::Config(format!("{name} must be positive")));
            }
        }
        if self.ignore_dirs.iter().any(|dir| dir.contains('/')) {
            return Err(PipelineError::Config(
                "ignoreDirs takes directory names, not paths".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_dir_for(&self, output: &Path) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| output.join(".cache"))
    }
}
