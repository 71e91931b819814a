// Service configuration
//
// Layers, later wins: defaults → JSON file → environment → CLI flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::downloader::lifecycle::DEFAULT_CLEANUP_DELAY;
use crate::downloader::resolver::{MAX_TRENDING, TRENDING_QUERY};

pub const ENV_WORK_DIR: &str = "YT_FETCH_WORK_DIR";
pub const ENV_YTDLP: &str = "YT_FETCH_YTDLP";
pub const ENV_FFMPEG: &str = "YT_FETCH_FFMPEG";
pub const ENV_PROXY: &str = "YT_FETCH_PROXY";
pub const ENV_CLEANUP_DELAY: &str = "YT_FETCH_CLEANUP_DELAY";
pub const ENV_MAX_JOBS: &str = "YT_FETCH_MAX_JOBS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding `file_*` temporaries
    pub work_dir: PathBuf,
    /// yt-dlp binary; auto-detected when unset
    pub ytdlp_path: Option<String>,
    /// ffmpeg binary; auto-detected when unset
    pub ffmpeg_path: Option<String>,
    /// HTTP/SOCKS proxy handed to the engine
    pub proxy: Option<String>,
    pub cleanup_delay_secs: u64,
    pub socket_timeout_secs: u32,
    pub metadata_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Engine downloads allowed to run at once
    pub max_concurrent_jobs: usize,
    pub trending_limit: usize,
    pub trending_query: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            ytdlp_path: None,
            ffmpeg_path: None,
            proxy: None,
            cleanup_delay_secs: DEFAULT_CLEANUP_DELAY.as_secs(),
            socket_timeout_secs: 30,
            metadata_timeout_secs: 60,
            download_timeout_secs: 30 * 60,
            max_concurrent_jobs: 4,
            trending_limit: MAX_TRENDING,
            trending_query: TRENDING_QUERY.to_string(),
        }
    }
}

impl ServiceConfig {
    /// `$XDG_CONFIG_HOME/yt-fetch/config.json` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("yt-fetch").join("config.json"))
    }

    /// Defaults, then `path` (or the default file when present), then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values found through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_YTDLP) {
            self.ytdlp_path = Some(path);
        }
        if let Some(path) = lookup(ENV_FFMPEG) {
            self.ffmpeg_path = Some(path);
        }
        if let Some(proxy) = lookup(ENV_PROXY) {
            self.proxy = Some(proxy).filter(|p| !p.is_empty());
        }
        if let Some(value) = lookup(ENV_CLEANUP_DELAY) {
            self.cleanup_delay_secs = parse_number(ENV_CLEANUP_DELAY, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_JOBS) {
            self.max_concurrent_jobs = parse_number(ENV_MAX_JOBS, &value)?;
        }
        Ok(self)
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.work_dir = dir;
        }
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.ytdlp_path = path;
        }
        self
    }

    pub fn with_ffmpeg_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.ffmpeg_path = path;
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.proxy = proxy;
        }
        self
    }

    pub fn with_cleanup_delay(mut self, secs: u64) -> Self {
        self.cleanup_delay_secs = secs;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs;
        self
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    /// Zero would deadlock the job semaphore.
    pub fn job_permits(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
