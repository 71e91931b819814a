// Downloader module - job orchestration and temp-file lifecycle

pub mod engine;
pub mod errors;
pub mod id;
pub mod instructions;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod storage;
pub mod utils;

pub use engine::{MediaEngine, YtDlpEngine};
pub use errors::{DownloadError, EngineError};
pub use instructions::{EngineInstructions, PostProcess};
pub use lifecycle::{sweep_startup, CleanupScheduler};
pub use models::{
    Delivery, DeliveryMode, FlatEntry, FormatDescriptor, JobRequest, RawFormat, ResolvedVideo,
    TrendingEntry, VideoMetadata,
};
pub use orchestrator::{Downloader, JobState};
pub use resolver::FormatResolver;
pub use storage::Storage;
