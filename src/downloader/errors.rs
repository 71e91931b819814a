// Error types for the engine and the job pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a `MediaEngine` implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// yt-dlp binary missing or not executable
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Subprocess exceeded its time budget and was killed
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Engine exited with a non-zero status
    #[error("execution error: {stderr}")]
    Execution { stderr: String },

    /// Engine output could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// Engine finished but never printed the artifact path
    #[error("engine did not report an output file")]
    NoArtifactReported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Build an execution error from captured stderr, keeping the last
    /// `ERROR:` line when yt-dlp printed one.
    pub fn from_stderr(stderr: &[u8]) -> Self {
        let text = String::from_utf8_lossy(stderr);
        let message = text
            .lines()
            .rev()
            .find(|line| line.starts_with("ERROR:"))
            .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
            .unwrap_or_else(|| text.trim().to_string());

        Self::Execution { stderr: message }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(format!("Invalid JSON: {}", error))
    }
}

/// Failures surfaced by the format resolver and the download orchestrator.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Metadata fetch failed
    #[error("could not read video info: {0}")]
    Extraction(#[source] EngineError),

    /// Download or transcode failed
    #[error("download failed: {0}")]
    Engine(#[source] EngineError),

    /// Engine ran but nothing carrying the job prefix exists
    #[error("file was not created for job {job_id}")]
    ArtifactNotFound { job_id: String },

    /// More than one output carries the job prefix
    #[error("job {job_id} produced {} candidate files", candidates.len())]
    AmbiguousArtifact {
        job_id: String,
        candidates: Vec<PathBuf>,
    },

    /// Video modes need an explicit format id
    #[error("format id is required for {mode} downloads")]
    MissingFormat { mode: &'static str },

    /// The job task panicked
    #[error("job task failed: {0}")]
    TaskFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Status code a delivery layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MissingFormat { .. } => 400,
            Self::Extraction(_) | Self::Engine(_) => 502,
            Self::ArtifactNotFound { .. }
            | Self::AmbiguousArtifact { .. }
            | Self::TaskFailed(_)
            | Self::Io(_) => 500,
        }
    }
}
