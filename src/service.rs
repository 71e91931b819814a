// Process-wide wiring: storage, engine, resolver, downloader

use std::io;
use std::sync::Arc;

use tracing::info;

use crate::config::ServiceConfig;
use crate::downloader::{
    sweep_startup, CleanupScheduler, Downloader, FormatResolver, MediaEngine, Storage,
    YtDlpEngine,
};

/// Everything a delivery layer needs to serve requests.
#[derive(Clone)]
pub struct Service {
    config: ServiceConfig,
    resolver: FormatResolver,
    downloader: Downloader,
}

impl Service {
    /// Start against the yt-dlp binary.
    pub fn start(config: ServiceConfig) -> io::Result<Self> {
        let engine = YtDlpEngine::new(&config);
        info!(
            ytdlp = engine.ytdlp_path(),
            ffmpeg = engine.ffmpeg_path(),
            "using yt-dlp engine"
        );
        Self::with_engine(config, Arc::new(engine))
    }

    /// Open the work directory and sweep leftovers before anything is served.
    pub fn with_engine(config: ServiceConfig, engine: Arc<dyn MediaEngine>) -> io::Result<Self> {
        let storage = Storage::open(&config.work_dir)?;
        let swept = sweep_startup(&storage);
        info!(
            work_dir = %storage.root().display(),
            swept,
            cleanup_delay_secs = config.cleanup_delay_secs,
            "service ready"
        );

        let resolver = FormatResolver::new(Arc::clone(&engine))
            .with_trending(config.trending_query.clone(), config.trending_limit);
        let downloader = Downloader::new(
            engine,
            storage,
            CleanupScheduler::new(config.cleanup_delay()),
            config.job_permits(),
        );

        Ok(Self {
            config,
            resolver,
            downloader,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn resolver(&self) -> &FormatResolver {
        &self.resolver
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }
}
