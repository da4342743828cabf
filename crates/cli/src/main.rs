use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};

use tracker_core::annotation::infrastructure::box_annotator::BoxAnnotator;
use tracker_core::capture::infrastructure::ffmpeg_camera_source::FfmpegCameraSource;
use tracker_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxDetectorLoader, DEFAULT_CLASS_ID, DEFAULT_CONFIDENCE,
};
use tracker_core::pipeline::pipeline_config::PipelineConfig;
use tracker_core::pipeline::pipeline_logger::LogPipelineLogger;
use tracker_core::pipeline::state_holder::StateHolder;
use tracker_core::pipeline::supervisor::Supervisor;
use tracker_core::serving::infrastructure::http_server::{spawn_http_server, ServerConfig};
use tracker_core::shared::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_LABEL,
};

/// Detect people on a camera feed and serve the latest detections as JSON.
#[derive(Parser)]
#[command(name = "tracker", override_usage = "tracker [camera ID] [detector model file]")]
struct Cli {
    /// Camera device number (0 is usually the built-in camera).
    device_id: Option<u32>,

    /// Detector model file (.onnx).
    detector_config: Option<PathBuf>,

    /// HTTP port for the JSON endpoint.
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    port: u16,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = DEFAULT_HTTP_HOST)]
    host: String,

    /// Milliseconds between capture cycles.
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Detector class index to report (0 is "person" for COCO models).
    #[arg(long, default_value_t = DEFAULT_CLASS_ID)]
    class_id: usize,

    /// Documents buffered between capture and annotation (0 or 1).
    /// 0 makes capture wait until the annotator takes each document.
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Text drawn above every detected region.
    #[arg(long, default_value = DEFAULT_LABEL)]
    label: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (Some(device_id), Some(detector_config)) = (cli.device_id, cli.detector_config.clone())
    else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };
    validate(&cli)?;

    let config = PipelineConfig::new(device_id, detector_config)
        .with_interval(Duration::from_millis(cli.interval_ms))?
        .with_channel_capacity(cli.channel_capacity)?;
    let state = Arc::new(StateHolder::new());

    let server = spawn_http_server(
        Arc::clone(&state),
        &ServerConfig {
            host: cli.host,
            port: cli.port,
        },
    )?;

    let loader = OnnxDetectorLoader {
        confidence: cli.confidence,
        class_id: cli.class_id,
    };
    let pipeline = Supervisor::new(
        config,
        Box::new(FfmpegCameraSource::new()),
        Box::new(loader),
        Box::new(BoxAnnotator::new(cli.label)),
    )
    .with_logger(Box::new(LogPipelineLogger::default()))
    .start(state)?;

    // The endpoint keeps serving the last document even if capture stops.
    server.wait();

    pipeline.cancel();
    let report = pipeline.join()?;
    log::info!(
        "Captured {} documents, {} transient failures",
        report.capture.cycles,
        report.capture.transient_failures
    );
    for error in &report.fatal_errors {
        log::error!("{error}");
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    if cli.interval_ms == 0 {
        return Err("Interval must be at least 1 ms".into());
    }
    if cli.channel_capacity > 1 {
        return Err(format!(
            "Channel capacity must be 0 or 1, got {}",
            cli.channel_capacity
        )
        .into());
    }
    if cli.label.is_empty() {
        return Err("Label must not be empty".into());
    }
    Ok(())
}
