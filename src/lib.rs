pub mod commands;
pub mod config;
pub mod downloader;
pub mod service;

pub use commands::{download_video, get_formats, get_trending, ErrorBody, TrendingResponse};
pub use config::{ConfigError, ServiceConfig};
pub use service::Service;
