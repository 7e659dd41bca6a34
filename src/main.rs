use airmouse_calib::CalibrationParameters;
use airmouse_imu::pipeline::Pipeline;
use airmouse_imu::samplelog::read_sample_log;
use airmouse_imu::TrackerClient;
use airmouse_input::LogSink;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Air-mouse orientation tracker.
///
/// Replays a recorded sample log through calibration, sensor fusion and
/// pointer mapping, logging orientation and pointer motion.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Calibration JSON, overriding `calibration_path` from the config
    #[arg(long)]
    calib: Option<PathBuf>,

    /// Sample log (CSV) to replay
    #[arg(long)]
    replay: PathBuf,

    /// Capacity of the sample channel
    #[arg(long, default_value_t = 256)]
    channel_capacity: usize,
}

fn load_calibration(path: Option<&PathBuf>) -> Result<CalibrationParameters> {
    match path {
        Some(path) => {
            let params = CalibrationParameters::load_json(path)?;
            info!(?path, "Calibration loaded");
            Ok(params)
        }
        None => {
            warn!("No calibration file given, using identity calibration");
            Ok(CalibrationParameters::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airmouse_app=info,airmouse_imu=info,airmouse_calib=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("Air mouse tracker starting");

    let config = match &args.config {
        Some(path) => airmouse_config::load_config_from(path)?,
        None => airmouse_config::load_config()?,
    };
    info!(
        strategy = ?config.mouse.strategy,
        beta = config.imu.madgwick_beta,
        "Config loaded"
    );

    let calibration = load_calibration(args.calib.as_ref().or(config.calibration_path.as_ref()))?;
    let pipeline = Pipeline::new(Arc::new(calibration), &config).context("invalid axis alignment")?;

    let records = read_sample_log(&args.replay)?;

    let (sample_tx, sample_rx) = mpsc::channel(args.channel_capacity.max(1));
    let client = TrackerClient::spawn(pipeline, sample_rx, Box::new(LogSink::default()));

    // Report orientation roughly once per second of samples.
    let mut updates = client.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let orientation = *updates.borrow_and_update();
            if orientation.samples % 50 == 0 {
                let e = orientation.euler();
                info!(
                    samples = orientation.samples,
                    roll = e.roll.to_degrees(),
                    pitch = e.pitch.to_degrees(),
                    yaw = e.yaw.to_degrees(),
                    "Orientation"
                );
            }
        }
    });

    for record in &records {
        if sample_tx.send(record.sample()).await.is_err() {
            warn!("Tracker stopped early");
            break;
        }
    }
    drop(sample_tx);

    let summary = client.finish().await?;
    watcher.await?;

    let e = summary.final_orientation.euler();
    info!(
        processed = summary.processed,
        dropped = summary.dropped,
        pointer_events = summary.pointer_events,
        pointer_dx = summary.pointer_total.0,
        pointer_dy = summary.pointer_total.1,
        roll = e.roll.to_degrees(),
        pitch = e.pitch.to_degrees(),
        yaw = e.yaw.to_degrees(),
        "Replay finished"
    );

    Ok(())
}
