use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use sketch_export::{
    ExportSession, FfmpegSinkFactory, RecordingSinkFactory, ServerConfig, SinkFactory,
    StreamConfig, StreamFormat,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sketch-export", version, about = "Frame and GIF/MP4 export server for browser sketches")]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory frames and encoded streams are written to (default: current directory).
    #[arg(long, conflicts_with = "no_output")]
    output: Option<PathBuf>,

    /// Disable all writes.
    #[arg(long)]
    no_output: bool,

    /// Stream frames into a single encoded file instead of writing one file per frame.
    #[arg(long, value_enum, conflicts_with = "no_stream")]
    stream: Option<StreamChoice>,

    /// Disable streaming even if the config file enables it.
    #[arg(long)]
    no_stream: bool,

    /// Buffer each frame fully in memory before handing it to the encoder.
    #[arg(long)]
    stream_buffer: bool,

    /// Encoder binary.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// MP4 constant rate factor (0-51, lower is better).
    #[arg(long)]
    crf: Option<u8>,

    /// Verbose logging, including encoder output.
    #[arg(long)]
    debug: bool,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 9966)]
    port: u16,

    /// Maximum request body size in MiB.
    #[arg(long)]
    max_upload_mb: Option<usize>,

    /// Accept streams without running an encoder (frames are counted and dropped).
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StreamChoice {
    Gif,
    Mp4,
}

impl From<StreamChoice> for StreamFormat {
    fn from(choice: StreamChoice) -> Self {
        match choice {
            StreamChoice::Gif => StreamFormat::Gif,
            StreamChoice::Mp4 => StreamFormat::Mp4,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(config.debug);

    let factory: Arc<dyn SinkFactory> = if cli.dry_run {
        tracing::warn!("dry run: streams are not encoded");
        Arc::new(RecordingSinkFactory::discarding())
    } else {
        Arc::new(FfmpegSinkFactory)
    };

    let session = Arc::new(ExportSession::new(config, factory));
    sketch_export::api::serve(session, SocketAddr::new(cli.host, cli.port)).await
}

fn build_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => ServerConfig {
            output: Some(PathBuf::from(".")),
            ..Default::default()
        },
    };

    if cli.no_output {
        config.output = None;
    } else if let Some(output) = &cli.output {
        config.output = Some(output.clone());
    }

    if cli.no_stream {
        config.stream = None;
    } else if let Some(choice) = cli.stream {
        let stream = config.stream.get_or_insert_with(StreamConfig::default);
        stream.format = choice.into();
    }
    if let Some(stream) = config.stream.as_mut() {
        stream.buffer |= cli.stream_buffer;
        if let Some(ffmpeg) = &cli.ffmpeg {
            stream.ffmpeg = ffmpeg.clone();
        }
        if cli.crf.is_some() {
            stream.crf = cli.crf;
        }
    }

    config.debug |= cli.debug;
    if let Some(mb) = cli.max_upload_mb {
        config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "sketch_export=debug,tower_http=debug,info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
