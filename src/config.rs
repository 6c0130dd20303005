//! Index configuration
//!
//! Loaded from a JSON file or built in code. Every field has a default, so
//! an empty object `{}` is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::index::{IndexError, IndexResult};
use crate::observability::{Logger, Severity};

/// Files at least this many bytes are memory-mapped (one page).
pub const DEFAULT_MMAP_THRESHOLD: usize = 4096;

/// Largest value a direct index accepts by default.
pub const DEFAULT_MAX_BINS: u32 = 1 << 24;

/// Direct index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Always write 8-byte offsets (default: false)
    #[serde(default)]
    pub force_large_offsets: bool,

    /// Decode index files through a shared mapped buffer (default: true)
    #[serde(default = "default_use_mmap")]
    pub use_mmap: bool,

    /// Minimum file size in bytes for memory mapping (default: 4096)
    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold: usize,

    /// Construction rejects values at or above this (default: 1 << 24)
    #[serde(default = "default_max_bins")]
    pub max_bins: u32,

    /// Minimum log severity (default: "INFO")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_use_mmap() -> bool {
    true
}

fn default_mmap_threshold() -> usize {
    DEFAULT_MMAP_THRESHOLD
}

fn default_max_bins() -> u32 {
    DEFAULT_MAX_BINS
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            force_large_offsets: false,
            use_mmap: default_use_mmap(),
            mmap_threshold: default_mmap_threshold(),
            max_bins: default_max_bins(),
            log_level: default_log_level(),
        }
    }
}

impl IndexConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> IndexResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            IndexError::invalid_argument(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from JSON text
    pub fn from_json_str(content: &str) -> IndexResult<Self> {
        let config: IndexConfig = serde_json::from_str(content)
            .map_err(|e| IndexError::invalid_argument(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> IndexResult<()> {
        if self.max_bins == 0 {
            return Err(IndexError::invalid_argument("max_bins must be > 0"));
        }
        if Severity::parse(&self.log_level).is_none() {
            return Err(IndexError::invalid_argument(format!(
                "Invalid log_level: '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Config that always writes 8-byte offsets
    pub fn with_large_offsets(self) -> Self {
        Self {
            force_large_offsets: true,
            ..self
        }
    }

    /// Config that decodes through positioned file reads instead of a mapping
    pub fn without_mmap(self) -> Self {
        Self {
            use_mmap: false,
            ..self
        }
    }

    pub fn with_max_bins(self, max_bins: u32) -> Self {
        Self { max_bins, ..self }
    }

    pub fn with_mmap_threshold(self, mmap_threshold: usize) -> Self {
        Self {
            mmap_threshold,
            ..self
        }
    }

    /// Configured log severity, INFO if unparsable
    pub fn severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }

    /// Installs the configured log level as the global minimum
    pub fn apply_logging(&self) {
        Logger::set_min_severity(self.severity());
    }
}
