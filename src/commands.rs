// Request-level operations: trending feed, format listing, download
//
// Each returns a serializable success value or `{ "error": message }`.

use serde::Serialize;
use tracing::warn;

use crate::downloader::{
    Delivery, DeliveryMode, DownloadError, JobRequest, ResolvedVideo, TrendingEntry,
};
use crate::service::Service;

/// Uniform failure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    /// Suggested HTTP status; not part of the body
    #[serde(skip)]
    pub status: u16,
}

impl From<DownloadError> for ErrorBody {
    fn from(e: DownloadError) -> Self {
        Self {
            status: e.http_status(),
            error: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingResponse {
    pub videos: Vec<TrendingEntry>,
}

pub async fn get_trending(service: &Service) -> TrendingResponse {
    TrendingResponse {
        videos: service.resolver().trending().await,
    }
}

pub async fn get_formats(service: &Service, url: String) -> Result<ResolvedVideo, ErrorBody> {
    Ok(service.resolver().resolve(&url).await?)
}

/// `mode` is `"audio"`, `"video_only"`, or anything else for muxed.
pub async fn download_video(
    service: &Service,
    url: String,
    format_id: String,
    mode: String,
) -> Result<Delivery, ErrorBody> {
    let request = JobRequest::new(url, DeliveryMode::from_form(&mode)).with_format(format_id);
    service.downloader().download(request).await.map_err(|e| {
        warn!(error = %e, "download request failed");
        ErrorBody::from(e)
    })
}
