use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use signcast_core::LabelSet;
use signcast_server::{DeliveryMode, ServerConfig};
use signcast_telemetry::{LogFormat, TelemetryConfig};
use signcast_vision::{
    CodecConfig, DetectorConfig, DetectorWorker, FrameCodec, OutputFormat, PlaceholderDetector,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Labels {
    En,
    Zh,
}

impl Labels {
    fn vocabulary(self) -> LabelSet {
        match self {
            Labels::En => LabelSet::sign_vocabulary(),
            Labels::Zh => LabelSet::sign_vocabulary_zh(),
        }
    }
}

/// Real-time sign detection relay: camera frames in, annotated detections out.
#[derive(Debug, Parser)]
#[command(name = "signcast", version)]
struct Cli {
    #[arg(long, env = "SIGNCAST_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "SIGNCAST_PORT", default_value_t = 8765)]
    port: u16,

    /// trace, debug, info, warn or error. RUST_LOG takes precedence.
    #[arg(long, env = "SIGNCAST_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// json or pretty
    #[arg(long, env = "SIGNCAST_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// broadcast: every client sees every result. unicast: only the sender does.
    #[arg(long, env = "SIGNCAST_DELIVERY_MODE", default_value = "broadcast")]
    delivery_mode: DeliveryMode,

    /// Per-frame detection deadline. 0 disables it.
    #[arg(long, env = "SIGNCAST_DETECT_TIMEOUT_MS", default_value_t = 10_000)]
    detect_timeout_ms: u64,

    /// Vocabulary for class names. zh matches the platform's default locale.
    #[arg(long, value_enum, env = "SIGNCAST_LABELS", default_value = "zh")]
    labels: Labels,

    /// Upper bound on detections the placeholder backend emits per frame.
    #[arg(long, env = "SIGNCAST_MAX_DETECTIONS", default_value_t = 3)]
    max_detections: usize,

    /// Seed the placeholder backend for reproducible output.
    #[arg(long, env = "SIGNCAST_SEED")]
    seed: Option<u64>,

    #[arg(long, env = "SIGNCAST_OUTPUT_FORMAT", default_value = "jpeg")]
    output_format: OutputFormat,

    #[arg(long, env = "SIGNCAST_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Return frames without boxes drawn on them.
    #[arg(long, env = "SIGNCAST_NO_ANNOTATE")]
    no_annotate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = signcast_telemetry::init_telemetry(TelemetryConfig {
        log_level: cli.log_level,
        module_levels: Vec::new(),
        format: cli.log_format,
    });
    let metrics = telemetry.metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting signcast");

    let mut backend = PlaceholderDetector::new(cli.labels.vocabulary(), cli.max_detections);
    if let Some(seed) = cli.seed {
        backend = backend.with_seed(seed);
    }

    let detector_config = DetectorConfig {
        timeout: (cli.detect_timeout_ms > 0).then(|| Duration::from_millis(cli.detect_timeout_ms)),
        ..Default::default()
    };
    let (worker, detector) = DetectorWorker::spawn(backend, detector_config, metrics.clone())
        .context("Failed to spawn detector worker")?;

    let codec = FrameCodec::new(CodecConfig {
        format: cli.output_format,
        jpeg_quality: cli.jpeg_quality,
    });

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        delivery_mode: cli.delivery_mode,
        annotate: !cli.no_annotate,
        ..Default::default()
    };
    let handle = signcast_server::start(config, detector, codec, metrics)
        .await
        .context("Failed to start server")?;

    tracing::info!(addr = %handle.local_addr(), "Signcast server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    handle.shutdown().await;
    // sessions hold the last detector handles; the worker exits once they are gone
    let joined = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::task::spawn_blocking(move || worker.join()),
    )
    .await;
    if joined.is_err() {
        tracing::warn!("Detector worker did not stop in time");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
