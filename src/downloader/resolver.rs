// Format resolution and trending feed

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::engine::MediaEngine;
use super::errors::DownloadError;
use super::models::{FlatEntry, FormatDescriptor, RawFormat, ResolvedVideo, TrendingEntry};

pub const MAX_TRENDING: usize = 15;
pub const TRENDING_QUERY: &str = "popular videos";
pub const TITLE_MAX_CHARS: usize = 40;

/// Keep entries that are not audio-only and have a height, one per label,
/// tallest first.
///
/// When several formats share a label the first one in engine order wins.
/// yt-dlp lists formats deterministically for a given response, but nothing
/// guarantees the order across calls. The height sort is stable, so ties keep
/// engine order.
pub fn select_formats(raw: &[RawFormat]) -> Vec<FormatDescriptor> {
    let mut seen = HashSet::new();
    let mut formats: Vec<FormatDescriptor> = raw
        .iter()
        .filter(|f| f.has_video())
        .filter_map(|f| f.height.filter(|h| *h > 0).map(|h| FormatDescriptor::new(&f.format_id, h)))
        .filter(|d| seen.insert(d.label.clone()))
        .collect();

    formats.sort_by(|a, b| b.height.cmp(&a.height));
    formats
}

/// Build a feed entry from a flat search hit; hits without an id are dropped.
pub fn trending_entry(entry: &FlatEntry) -> Option<TrendingEntry> {
    let id = entry.id.as_deref().filter(|id| !id.is_empty())?;
    let title: String = entry
        .title
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();

    Some(TrendingEntry {
        title,
        thumbnail: format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", id),
        url: format!("https://www.youtube.com/watch?v={}", id),
    })
}

/// Read-only queries against the engine.
#[derive(Clone)]
pub struct FormatResolver {
    engine: Arc<dyn MediaEngine>,
    trending_query: String,
    trending_limit: usize,
}

impl FormatResolver {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            trending_query: TRENDING_QUERY.to_string(),
            trending_limit: MAX_TRENDING,
        }
    }

    /// Limit is capped at [`MAX_TRENDING`].
    pub fn with_trending(mut self, query: impl Into<String>, limit: usize) -> Self {
        self.trending_query = query.into();
        self.trending_limit = limit.min(MAX_TRENDING);
        self
    }

    pub async fn resolve(&self, url: &str) -> Result<ResolvedVideo, DownloadError> {
        let metadata = self.engine.fetch_metadata(url).await.map_err(|e| {
            warn!(engine = self.engine.name(), url, error = %e, "metadata fetch failed");
            DownloadError::Extraction(e)
        })?;

        let formats = select_formats(&metadata.formats);
        debug!(
            url,
            candidates = metadata.formats.len(),
            selectable = formats.len(),
            "formats resolved"
        );

        Ok(ResolvedVideo {
            title: metadata.title,
            thumbnail: metadata.thumbnail,
            formats,
        })
    }

    /// Never fails: any engine problem yields an empty feed.
    pub async fn trending(&self) -> Vec<TrendingEntry> {
        match self
            .engine
            .search(&self.trending_query, self.trending_limit)
            .await
        {
            Ok(entries) => entries
                .iter()
                .filter_map(trending_entry)
                .take(self.trending_limit)
                .collect(),
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "trending search failed");
                Vec::new()
            }
        }
    }
}
