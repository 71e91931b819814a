#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use yt_fetch_lib::downloader::{
    EngineError, EngineInstructions, FlatEntry, MediaEngine, RawFormat, VideoMetadata,
};
use yt_fetch_lib::{Service, ServiceConfig};

/// What the scripted engine does on `download`.
#[derive(Debug, Clone)]
pub enum DownloadScript {
    /// Write the expected path and report it
    Write,
    /// Write with a different extension and report that path
    WriteAs(&'static str),
    /// Report the expected path without writing anything
    Nothing,
    /// Write the expected path plus an intermediate leftover
    WithLeftover,
    /// Write a partial file, then fail
    PartialThenFail(&'static str),
    /// Write a partial file, then panic
    PartialThenPanic,
}

pub struct ScriptedEngine {
    pub metadata: Option<VideoMetadata>,
    pub search_hits: Option<Vec<FlatEntry>>,
    pub script: DownloadScript,
    pub delay: Duration,
    pub downloads: AtomicUsize,
    pub instructions: Mutex<Vec<EngineInstructions>>,
}

impl ScriptedEngine {
    pub fn new(script: DownloadScript) -> Self {
        Self {
            metadata: None,
            search_hits: None,
            script,
            delay: Duration::ZERO,
            downloads: AtomicUsize::new(0),
            instructions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_search(mut self, hits: Vec<FlatEntry>) -> Self {
        self.search_hits = Some(hits);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, EngineError> {
        self.metadata.clone().ok_or_else(|| EngineError::Execution {
            stderr: format!("Unable to download webpage: {}", url),
        })
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<FlatEntry>, EngineError> {
        match &self.search_hits {
            Some(hits) => Ok(hits.iter().take(limit).cloned().collect()),
            None => Err(EngineError::Timeout { secs: 30 }),
        }
    }

    async fn download(
        &self,
        url: &str,
        instructions: &EngineInstructions,
    ) -> Result<PathBuf, EngineError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.instructions.lock().unwrap().push(instructions.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let expected = instructions.expected_path.clone();
        match &self.script {
            DownloadScript::Write => {
                fs::write(&expected, b"media")?;
                Ok(expected)
            }
            DownloadScript::WriteAs(ext) => {
                let path = expected.with_extension(ext);
                fs::write(&path, b"media")?;
                Ok(path)
            }
            DownloadScript::Nothing => Ok(expected),
            DownloadScript::WithLeftover => {
                fs::write(&expected, b"media")?;
                fs::write(expected.with_extension("f137.mp4"), b"part")?;
                Ok(expected)
            }
            DownloadScript::PartialThenFail(message) => {
                fs::write(expected.with_extension("webm"), b"part")?;
                Err(EngineError::Execution {
                    stderr: format!("{} ({})", message, url),
                })
            }
            DownloadScript::PartialThenPanic => {
                fs::write(expected.with_extension("webm"), b"part")?;
                panic!("engine crashed on {}", url);
            }
        }
    }
}

pub fn raw(id: &str, height: Option<u32>, vcodec: &str) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        height,
        vcodec: Some(vcodec.to_string()),
        ..Default::default()
    }
}

pub fn service_in(dir: &TempDir, engine: Arc<ScriptedEngine>) -> Service {
    service_with(dir, engine, ServiceConfig::default())
}

pub fn service_with(dir: &TempDir, engine: Arc<ScriptedEngine>, config: ServiceConfig) -> Service {
    let config = config.with_work_dir(Some(dir.path().to_path_buf()));
    Service::with_engine(config, engine).expect("service starts")
}

pub fn file_entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("file_"))
        .collect();
    names.sort();
    names
}
