//! # Configuration
//!
//! Gateway configuration is loaded with [`confique`], layered in priority order:
//!
//! 1. **Environment variables**: `NOTESYNC_ENDPOINT`, `NOTESYNC_MAX_RETRIES`, etc.
//! 2. **Config file**: an optional TOML file (`notesync --config FILE`).
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | `endpoint` | `NOTESYNC_ENDPOINT` | `notesync-local` | Store endpoint to connect to |
//! | `isolated` | `NOTESYNC_ISOLATED` | `false` | Private tree instead of the shared one |
//! | `request_timeout_ms` | `NOTESYNC_REQUEST_TIMEOUT_MS` | `5000` | Per-attempt timeout for fetches and authentication |
//! | `max_retries` | `NOTESYNC_MAX_RETRIES` | `2` | Reissues after a timeout |
//! | `retry_backoff_ms` | `NOTESYNC_RETRY_BACKOFF_MS` | `250` | First backoff, doubled per retry |
//! | `data_dir` | `NOTESYNC_DATA_DIR` | platform data dir | Where the CLI keeps its state |

use crate::error::{GatewayError, Result};
use crate::request::RetryPolicy;
use crate::store::memory::DEFAULT_ENDPOINT;
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    #[config(env = "NOTESYNC_ENDPOINT", default = "notesync-local")]
    pub endpoint: String,

    #[config(env = "NOTESYNC_ISOLATED", default = false)]
    pub isolated: bool,

    #[config(env = "NOTESYNC_REQUEST_TIMEOUT_MS", default = 5000)]
    pub request_timeout_ms: u64,

    #[config(env = "NOTESYNC_MAX_RETRIES", default = 2)]
    pub max_retries: u32,

    #[config(env = "NOTESYNC_RETRY_BACKOFF_MS", default = 250)]
    pub retry_backoff_ms: u64,

    /// When absent, the platform data directory is used.
    #[config(env = "NOTESYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            isolated: false,
            request_timeout_ms: 5000,
            max_retries: 2,
            retry_backoff_ms: 250,
            data_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Environment over `file` (skipped if missing) over defaults.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_layered(Self::builder().env(), file)
    }

    /// `builder` carries the sources that outrank `file`.
    fn load_layered(mut builder: confique::Builder<Self>, file: Option<&Path>) -> Result<Self> {
        if let Some(file) = file {
            builder = builder.file(file);
        }
        let config = builder
            .load()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "notesync")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| GatewayError::Config("no home directory to keep state in".to_string()))
    }
}
