// Common data models for the fetch pipeline

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One entry of the engine's format list, as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
}

impl RawFormat {
    /// Only the literal `"none"` marks an audio-only entry. An unknown codec
    /// is common for HLS and progressive formats outside YouTube.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }
}

/// Metadata-only view of a remote video.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// Entry of a flat search listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A selectable encoding, serialized as `{id, res, h}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    #[serde(rename = "id")]
    pub format_id: String,
    #[serde(rename = "res")]
    pub label: String,
    #[serde(rename = "h")]
    pub height: u32,
}

impl FormatDescriptor {
    pub fn new(format_id: impl Into<String>, height: u32) -> Self {
        Self {
            format_id: format_id.into(),
            label: Self::label_for(height),
            height,
        }
    }

    pub fn label_for(height: u32) -> String {
        format!("{}p (mp4)", height)
    }
}

/// Result of format resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVideo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingEntry {
    pub title: String,
    pub thumbnail: String,
    pub url: String,
}

/// How the artifact is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Best audio, transcoded to MP3
    Audio,
    /// Requested video stream only, audio stripped
    VideoOnly,
    /// Requested video stream merged with best audio
    #[default]
    Muxed,
}

impl DeliveryMode {
    /// Parse the client's mode string; anything unrecognised means muxed.
    pub fn from_form(value: &str) -> Self {
        match value {
            "audio" => Self::Audio,
            "video_only" => Self::VideoOnly,
            _ => Self::Muxed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::VideoOnly => "video_only",
            Self::Muxed => "muxed",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::VideoOnly | Self::Muxed => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/mpeg",
            Self::VideoOnly | Self::Muxed => "video/mp4",
        }
    }

    /// Suggested download name for the client.
    pub fn delivery_name(&self, job_id: &str) -> String {
        match self {
            Self::Audio => format!("audio_{}.mp3", job_id),
            Self::VideoOnly | Self::Muxed => format!("video_{}.mp4", job_id),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub mode: DeliveryMode,
    pub format_id: Option<String>,
}

impl JobRequest {
    pub fn new(source_url: impl Into<String>, mode: DeliveryMode) -> Self {
        Self {
            source_url: source_url.into(),
            mode,
            format_id: None,
        }
    }

    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        let id = format_id.into();
        self.format_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }
}

/// A finished artifact, ready to be streamed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub job_id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_defaults_to_muxed() {
        assert_eq!(DeliveryMode::from_form("audio"), DeliveryMode::Audio);
        assert_eq!(DeliveryMode::from_form("video_only"), DeliveryMode::VideoOnly);
        assert_eq!(DeliveryMode::from_form("video"), DeliveryMode::Muxed);
        assert_eq!(DeliveryMode::from_form(""), DeliveryMode::Muxed);
    }

    #[test]
    fn audio_delivery_is_always_mp3() {
        let mode = DeliveryMode::Audio;
        assert_eq!(mode.content_type(), "audio/mpeg");
        assert_eq!(mode.delivery_name("0123abcd"), "audio_0123abcd.mp3");
    }

    #[test]
    fn video_modes_deliver_mp4() {
        for mode in [DeliveryMode::VideoOnly, DeliveryMode::Muxed] {
            assert_eq!(mode.content_type(), "video/mp4");
            assert!(mode.delivery_name("0123abcd").ends_with(".mp4"));
            assert_eq!(mode.extension(), "mp4");
        }
    }

    #[test]
    fn descriptor_serializes_short_keys() {
        let json = serde_json::to_value(FormatDescriptor::new("137", 1080)).unwrap();
        assert_eq!(json, serde_json::json!({"id": "137", "res": "1080p (mp4)", "h": 1080}));
    }

    #[test]
    fn blank_format_id_is_treated_as_absent() {
        let req = JobRequest::new("u", DeliveryMode::Muxed).with_format("  ");
        assert!(req.format_id.is_none());
    }

    #[test]
    fn has_video_rejects_none_codec() {
        let audio = RawFormat {
            format_id: "140".into(),
            vcodec: Some("none".into()),
            ..Default::default()
        };
        assert!(!audio.has_video());
    }

    #[test]
    fn unknown_codec_counts_as_video() {
        let hls = RawFormat {
            format_id: "hls-720".into(),
            height: Some(720),
            ..Default::default()
        };
        assert!(hls.has_video());
    }
}
