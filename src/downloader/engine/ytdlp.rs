// yt-dlp engine - drives the native `yt-dlp` binary
//
// Metadata and search read JSON from stdout. Downloads print the final path
// after all post-processors ran (`--print after_move:...`), so the caller
// never has to guess which extension the engine settled on. Video-only
// downloads are re-encoded afterwards with ffmpeg directly: yt-dlp's own
// converter skips files already in the target container.

use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::traits::MediaEngine;
use crate::config::ServiceConfig;
use crate::downloader::errors::EngineError;
use crate::downloader::instructions::{EngineInstructions, PostProcess};
use crate::downloader::models::{FlatEntry, VideoMetadata};
use crate::downloader::utils::{run_lines_with_timeout, run_output_with_timeout};

/// Prefix of the stdout line carrying the artifact path.
const ARTIFACT_MARKER: &str = "artifact:";

/// Parse a yt-dlp progress line like
/// `[download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59`.
/// Returns (percent, status_string).
pub fn parse_progress(line: &str) -> Option<(f32, String)> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%(?:\s+of\s+~?\s*(\S+))?(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
        static ref CONVERT_RE: Regex =
            Regex::new(r"\[(ExtractAudio|VideoConvertor)\]\s+Destination").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map_or("?", |m| m.as_str());
        let speed = caps.get(3).map_or("?", |m| m.as_str());
        let status = match caps.get(4) {
            Some(eta) => format!("{:.1}% of {} @ {} ETA {}", percent, size, speed, eta.as_str()),
            None => format!("{:.1}% of {} @ {}", percent, size, speed),
        };
        return Some((percent, status));
    }

    if MERGE_RE.is_match(line) {
        return Some((100.0, "merging video and audio".to_string()));
    }

    if let Some(caps) = CONVERT_RE.captures(line) {
        return Some((100.0, format!("{} running", &caps[1])));
    }

    None
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

/// Engine backed by the yt-dlp CLI.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    ytdlp_path: String,
    ffmpeg_path: String,
    /// Handed to yt-dlp only when configured explicitly
    ffmpeg_location: Option<String>,
    proxy: Option<String>,
    socket_timeout_secs: u32,
    metadata_timeout_secs: u64,
    download_timeout_secs: u64,
}

impl YtDlpEngine {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            ytdlp_path: config
                .ytdlp_path
                .clone()
                .unwrap_or_else(|| Self::find_tool("yt-dlp")),
            ffmpeg_path: config
                .ffmpeg_path
                .clone()
                .unwrap_or_else(|| Self::find_tool("ffmpeg")),
            ffmpeg_location: config.ffmpeg_path.clone(),
            proxy: config.proxy.clone(),
            socket_timeout_secs: config.socket_timeout_secs,
            metadata_timeout_secs: config.metadata_timeout_secs,
            download_timeout_secs: config.download_timeout_secs,
        }
    }

    pub fn ytdlp_path(&self) -> &str {
        &self.ytdlp_path
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Find a binary in the usual install locations, then on `PATH`.
    pub fn find_tool(name: &str) -> String {
        for dir in ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"] {
            let path = Path::new(dir).join(name);
            if path.exists() {
                return path.to_string_lossy().into_owned();
            }
        }

        if let Ok(output) = StdCommand::new("which").arg(name).output() {
            if output.status.success() {
                if let Ok(path) = String::from_utf8(output.stdout) {
                    let trimmed = path.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }

        name.to_string()
    }

    /// Flags every invocation shares.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-check-certificates".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
        ];

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(["--dump-single-json".to_string(), "--skip-download".to_string()]);
        args.push(url.to_string());
        args
    }

    fn search_args(&self, query: &str, limit: usize) -> Vec<String> {
        let mut args = self.base_args();
        args.extend([
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--skip-download".to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
        ]);
        args.push(format!("ytsearch{}:{}", limit, query));
        args
    }

    fn download_args(&self, url: &str, instructions: &EngineInstructions) -> Vec<String> {
        let mut args = self.base_args();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-part".to_string(),
            "--no-simulate".to_string(),
            "-f".to_string(),
            instructions.format_selector.clone(),
            "-o".to_string(),
            instructions.output_template.to_string_lossy().into_owned(),
        ]);

        match &instructions.post_process {
            PostProcess::ExtractAudio {
                codec,
                bitrate_kbps,
            } => {
                args.extend([
                    "-x".to_string(),
                    "--audio-format".to_string(),
                    codec.to_string(),
                    "--audio-quality".to_string(),
                    format!("{}K", bitrate_kbps),
                ]);
            }
            // re-encoded after download, see `recode_video`
            PostProcess::RecodeVideo { .. } => {}
            PostProcess::Merge { container, .. } => {
                args.extend([
                    "--merge-output-format".to_string(),
                    container.to_string(),
                    "--postprocessor-args".to_string(),
                    format!("Merger:{}", instructions.post_process.ffmpeg_args().join(" ")),
                ]);
            }
        }

        args.push("--print".to_string());
        args.push(format!("after_move:{}%(filepath)s", ARTIFACT_MARKER));
        args.push(url.to_string());
        args
    }

    fn recode_args(source: &Path, output: &Path, container: &str, codec_args: &[String]) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        args.push(source.to_string_lossy().into_owned());
        args.extend(codec_args.iter().cloned());
        args.push("-f".to_string());
        args.push(container.to_string());
        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// Transcode `source` into the job's expected path.
    ///
    /// ffmpeg writes to a staging file under the job prefix, so a failed run
    /// is purged together with the rest of the job.
    async fn recode_video(
        &self,
        source: &Path,
        instructions: &EngineInstructions,
        container: &str,
    ) -> Result<PathBuf, EngineError> {
        let target = instructions.expected_path.clone();
        let staging = target.with_extension(format!("recode.{}", container));
        let args = Self::recode_args(
            source,
            &staging,
            container,
            &instructions.post_process.ffmpeg_args(),
        );
        info!(source = %source.display(), "re-encoding video stream");

        let out = run_output_with_timeout(&self.ffmpeg_path, &args, self.download_timeout_secs).await?;
        if !out.status.success() {
            return Err(EngineError::from_stderr(&out.stderr));
        }

        tokio::fs::remove_file(source).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(target)
    }

    fn parse_metadata(stdout: &[u8]) -> Result<VideoMetadata, EngineError> {
        Ok(serde_json::from_slice(stdout)?)
    }

    fn parse_search(stdout: &[u8]) -> Result<Vec<FlatEntry>, EngineError> {
        let playlist: FlatPlaylist = serde_json::from_slice(stdout)?;
        Ok(playlist.entries.into_iter().flatten().collect())
    }

    /// Last marker line wins; earlier ones belong to intermediate files.
    fn artifact_from_stdout(lines: &[String]) -> Option<PathBuf> {
        lines
            .iter()
            .rev()
            .find_map(|line| line.trim().strip_prefix(ARTIFACT_MARKER))
            .filter(|path| !path.is_empty() && *path != "NA")
            .map(PathBuf::from)
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, EngineError> {
        let args = self.metadata_args(url);
        debug!(program = %self.ytdlp_path, args = %args.join(" "), "fetching metadata");

        let out = run_output_with_timeout(&self.ytdlp_path, &args, self.metadata_timeout_secs).await?;
        if !out.status.success() {
            return Err(EngineError::from_stderr(&out.stderr));
        }
        Self::parse_metadata(&out.stdout)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<FlatEntry>, EngineError> {
        let args = self.search_args(query, limit);
        debug!(program = %self.ytdlp_path, query, limit, "searching");

        let out = run_output_with_timeout(&self.ytdlp_path, &args, self.metadata_timeout_secs).await?;
        if !out.status.success() {
            return Err(EngineError::from_stderr(&out.stderr));
        }
        Self::parse_search(&out.stdout)
    }

    async fn download(
        &self,
        url: &str,
        instructions: &EngineInstructions,
    ) -> Result<PathBuf, EngineError> {
        let args = self.download_args(url, instructions);
        info!(
            format = %instructions.format_selector,
            output = %instructions.output_template.display(),
            "starting engine download"
        );

        let out = run_lines_with_timeout(
            &self.ytdlp_path,
            &args,
            self.download_timeout_secs,
            |line| match parse_progress(line) {
                Some((percent, status)) => {
                    debug!(percent, "{}", status);
                    true
                }
                None => false,
            },
        )
        .await?;

        if !out.status.success() {
            return Err(EngineError::from_stderr(&out.stderr));
        }

        let artifact =
            Self::artifact_from_stdout(&out.stdout_lines).ok_or(EngineError::NoArtifactReported)?;

        match &instructions.post_process {
            PostProcess::RecodeVideo { container, .. } => {
                self.recode_video(&artifact, instructions, container).await
            }
            _ => Ok(artifact),
        }
    }
}
