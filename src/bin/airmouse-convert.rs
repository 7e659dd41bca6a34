use airmouse_calib::{CalibrationBlob, CalibrationParameters};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Pack a calibration JSON into the 32-byte blob read by the device driver
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Calibration JSON
    json_file: PathBuf,

    /// Binary blob to write
    output_file: PathBuf,

    /// Gyro low-pass smoothing factor in [0, 1]
    #[arg(long)]
    alpha: f32,

    /// Pointer sensitivity constant in [0, 1]
    #[arg(long)]
    mouse_k: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airmouse_convert=info,airmouse_calib=info".into()),
        )
        .init();

    let args = Args::parse();

    let params = CalibrationParameters::load_json(&args.json_file)?;
    let blob = CalibrationBlob::from_parameters(&params, args.alpha, args.mouse_k);
    blob.validate()
        .context("calibration outside the driver's accepted range")?;
    blob.save(&args.output_file)
        .with_context(|| format!("writing {}", args.output_file.display()))?;

    println!(
        "Wrote {} bytes to {}",
        CalibrationBlob::LEN,
        args.output_file.display()
    );
    println!("  gyro bias:  {:?}", blob.gyro_bias);
    println!("  gyro scale: {:?}", blob.gyro_scale);
    println!("  alpha: {}, mouse_k: {}", blob.alpha, blob.mouse_k);
    Ok(())
}
