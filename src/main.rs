use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use yt_fetch_lib::{download_video, get_formats, get_trending, Service, ServiceConfig};

#[derive(Parser)]
#[command(
    version,
    about = "List video formats and fetch a chosen encoding as a temporary file",
    long_about = "Resolves selectable formats of a remote video and downloads one as\n\
                  audio (mp3), video only (mp4) or merged video+audio (mp4).\n\
                  Results are printed as JSON on stdout; logs go to stderr."
)]
struct CliArgs {
    /// JSON config file (defaults to the per-user config when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for temporary `file_*` artifacts
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Path to the yt-dlp binary
    #[arg(long)]
    ytdlp: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Proxy URL handed to yt-dlp, e.g. socks5h://127.0.0.1:1080
    #[arg(long)]
    proxy: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the trending feed
    Trending,
    /// List selectable formats of a video
    Formats { url: String },
    /// Download a video in the given mode
    Download {
        url: String,
        /// Format id from `formats`; ignored in audio mode
        #[arg(short, long, default_value = "")]
        format_id: String,
        /// audio, video_only, or anything else for merged video+audio
        #[arg(short, long, default_value = "muxed")]
        mode: String,
        /// Copy the finished artifact here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("failed to serialize response: {}", e),
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match ServiceConfig::load(args.config.as_deref()) {
        Ok(config) => config
            .with_work_dir(args.work_dir)
            .with_ytdlp_path(args.ytdlp)
            .with_ffmpeg_path(args.ffmpeg)
            .with_proxy(args.proxy),
        Err(e) => {
            error!("{}", e);
            exit(2);
        }
    };

    let service = match Service::start(config) {
        Ok(service) => service,
        Err(e) => {
            error!("cannot open work directory: {}", e);
            exit(2);
        }
    };

    let ok = match args.command {
        Command::Trending => {
            print_json(&get_trending(&service).await);
            true
        }
        Command::Formats { url } => match get_formats(&service, url).await {
            Ok(resolved) => {
                print_json(&resolved);
                true
            }
            Err(body) => {
                print_json(&body);
                false
            }
        },
        Command::Download {
            url,
            format_id,
            mode,
            output,
        } => match download_video(&service, url, format_id, mode).await {
            Ok(delivery) => {
                print_json(&delivery);
                match output {
                    Some(dest) => {
                        let dest = if dest.is_dir() {
                            dest.join(&delivery.file_name)
                        } else {
                            dest
                        };
                        match tokio::fs::copy(&delivery.path, &dest).await {
                            Ok(_) => {
                                info!("saved {}", dest.display());
                                true
                            }
                            Err(e) => {
                                error!(
                                    "failed to copy {} to {}: {}",
                                    delivery.path.display(),
                                    dest.display(),
                                    e
                                );
                                false
                            }
                        }
                    }
                    None => true,
                }
            }
            Err(body) => {
                print_json(&body);
                false
            }
        },
    };

    // The deletion timers live on this runtime; keep it up until they fire.
    let cleanup = service.downloader().cleanup();
    let pending = cleanup.pending().len();
    if pending > 0 {
        info!(
            pending,
            delay_secs = cleanup.delay().as_secs(),
            "waiting for scheduled deletion"
        );
        cleanup.drain().await;
    }

    if !ok {
        exit(1);
    }
}
