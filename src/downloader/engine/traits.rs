// MediaEngine trait

use std::path::PathBuf;

use async_trait::async_trait;

use crate::downloader::errors::EngineError;
use crate::downloader::instructions::EngineInstructions;
use crate::downloader::models::{FlatEntry, VideoMetadata};

/// Opaque collaborator that reads remote metadata and produces media files.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Metadata only; nothing is written to disk.
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, EngineError>;

    /// Flat search listing, at most `limit` entries.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<FlatEntry>, EngineError>;

    /// Fetch and post-process `url`, returning the exact path written.
    async fn download(
        &self,
        url: &str,
        instructions: &EngineInstructions,
    ) -> Result<PathBuf, EngineError>;
}
