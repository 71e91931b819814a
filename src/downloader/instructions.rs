// Mode → engine instruction mapping
//
// | mode       | streams                  | post-processing                         |
// |------------|--------------------------|-----------------------------------------|
// | audio      | best audio               | extract to MP3 @ 192 kbps               |
// | video_only | requested format         | drop audio, H.264, yuv420p, MP4         |
// | muxed      | requested + best audio   | merge to MP4, H.264 + AAC, yuv420p      |

use std::path::PathBuf;

use super::errors::DownloadError;
use super::models::DeliveryMode;
use super::storage::Storage;

pub const AUDIO_CODEC: &str = "mp3";
pub const AUDIO_BITRATE_KBPS: u32 = 192;
pub const VIDEO_CODEC: &str = "libx264";
pub const MERGED_AUDIO_CODEC: &str = "aac";
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const CONTAINER: &str = "mp4";

/// What the engine does after fetching the streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcess {
    ExtractAudio {
        codec: &'static str,
        bitrate_kbps: u32,
    },
    /// Re-encode the downloaded stream without audio. Runs unconditionally,
    /// even when the source container already is the target one.
    RecodeVideo {
        container: &'static str,
        video_codec: &'static str,
        pixel_format: &'static str,
    },
    /// Merge video and audio streams into one container
    Merge {
        container: &'static str,
        video_codec: &'static str,
        audio_codec: &'static str,
        pixel_format: &'static str,
    },
}

impl PostProcess {
    /// ffmpeg arguments applied by the post-processor.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            Self::ExtractAudio { .. } => Vec::new(),
            Self::RecodeVideo {
                video_codec,
                pixel_format,
                ..
            } => vec!["-an", "-c:v", *video_codec, "-pix_fmt", *pixel_format],
            Self::Merge {
                video_codec,
                audio_codec,
                pixel_format,
                ..
            } => vec![
                "-c:v",
                *video_codec,
                "-c:a",
                *audio_codec,
                "-pix_fmt",
                *pixel_format,
            ],
        };
        args.into_iter().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInstructions {
    /// Engine stream selector, e.g. `137+bestaudio/best`
    pub format_selector: String,
    pub post_process: PostProcess,
    /// Output path template; the engine substitutes the final extension
    pub output_template: PathBuf,
    /// Where the artifact should end up when the engine keeps our extension
    pub expected_path: PathBuf,
}

impl EngineInstructions {
    pub fn for_job(
        mode: DeliveryMode,
        format_id: Option<&str>,
        storage: &Storage,
        job_id: &str,
    ) -> Result<Self, DownloadError> {
        let (format_selector, post_process) = match mode {
            DeliveryMode::Audio => (
                "bestaudio/best".to_string(),
                PostProcess::ExtractAudio {
                    codec: AUDIO_CODEC,
                    bitrate_kbps: AUDIO_BITRATE_KBPS,
                },
            ),
            DeliveryMode::VideoOnly => (
                require_format(mode, format_id)?.to_string(),
                PostProcess::RecodeVideo {
                    container: CONTAINER,
                    video_codec: VIDEO_CODEC,
                    pixel_format: PIXEL_FORMAT,
                },
            ),
            DeliveryMode::Muxed => (
                format!("{}+bestaudio/best", require_format(mode, format_id)?),
                PostProcess::Merge {
                    container: CONTAINER,
                    video_codec: VIDEO_CODEC,
                    audio_codec: MERGED_AUDIO_CODEC,
                    pixel_format: PIXEL_FORMAT,
                },
            ),
        };

        Ok(Self {
            format_selector,
            post_process,
            output_template: storage.output_template(job_id),
            expected_path: storage.artifact_path(job_id, mode.extension()),
        })
    }
}

fn require_format(mode: DeliveryMode, format_id: Option<&str>) -> Result<&str, DownloadError> {
    format_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(DownloadError::MissingFormat {
            mode: mode.as_str(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::new("/work")
    }

    #[test]
    fn audio_ignores_requested_format() {
        let i = EngineInstructions::for_job(DeliveryMode::Audio, Some("22"), &storage(), "abcd1234")
            .unwrap();
        assert_eq!(i.format_selector, "bestaudio/best");
        assert_eq!(
            i.post_process,
            PostProcess::ExtractAudio {
                codec: "mp3",
                bitrate_kbps: 192
            }
        );
        assert_eq!(i.expected_path, PathBuf::from("/work/file_abcd1234.mp3"));
        assert!(i.post_process.ffmpeg_args().is_empty());
    }

    #[test]
    fn audio_needs_no_format() {
        assert!(EngineInstructions::for_job(DeliveryMode::Audio, None, &storage(), "abcd1234").is_ok());
    }

    #[test]
    fn video_only_strips_audio() {
        let i =
            EngineInstructions::for_job(DeliveryMode::VideoOnly, Some("137"), &storage(), "abcd1234")
                .unwrap();
        assert_eq!(i.format_selector, "137");
        assert_eq!(
            i.post_process.ffmpeg_args(),
            vec!["-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"]
        );
        assert_eq!(i.expected_path, PathBuf::from("/work/file_abcd1234.mp4"));
    }

    #[test]
    fn muxed_combines_with_best_audio() {
        let i = EngineInstructions::for_job(DeliveryMode::Muxed, Some("137"), &storage(), "abcd1234")
            .unwrap();
        assert_eq!(i.format_selector, "137+bestaudio/best");
        assert_eq!(
            i.post_process.ffmpeg_args(),
            vec!["-c:v", "libx264", "-c:a", "aac", "-pix_fmt", "yuv420p"]
        );
        assert_eq!(i.output_template, PathBuf::from("/work/file_abcd1234.%(ext)s"));
    }

    #[test]
    fn video_modes_require_format() {
        for mode in [DeliveryMode::VideoOnly, DeliveryMode::Muxed] {
            let err = EngineInstructions::for_job(mode, Some(" "), &storage(), "abcd1234").unwrap_err();
            assert!(matches!(err, DownloadError::MissingFormat { .. }));
            let err = EngineInstructions::for_job(mode, None, &storage(), "abcd1234").unwrap_err();
            assert!(matches!(err, DownloadError::MissingFormat { .. }));
        }
    }
}
