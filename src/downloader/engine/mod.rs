// Extraction/transcode engines
//
// The pipeline talks to the outside world only through `MediaEngine`.
// `YtDlpEngine` drives the yt-dlp binary; tests plug in scripted fakes.

mod traits;
mod ytdlp;

pub use traits::MediaEngine;
pub use ytdlp::{parse_progress, YtDlpEngine};
