use airmouse_calib::{fit_accel, fit_gyro_bias, update_json, POOR_CONDITIONING};
use airmouse_imu::samplelog::read_sample_log;
use anyhow::{bail, Result};
use clap::{ArgGroup, Parser};
use nalgebra::Vector3;
use std::path::PathBuf;

/// Fit accelerometer or gyroscope calibration from a recorded sample log
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(group(ArgGroup::new("mode").required(true).args(["accel", "gyro"])))]
struct Args {
    /// Sample log (CSV) recorded for calibration
    csv_file: PathBuf,

    /// Calibration JSON to write; an existing file is updated in place
    output_file: PathBuf,

    /// Fit accelerometer bias and matrix (device held still in many orientations)
    #[arg(long)]
    accel: bool,

    /// Fit gyroscope bias (device at rest)
    #[arg(long)]
    gyro: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airmouse_calibrate=info,airmouse_imu=info,airmouse_calib=info".into()),
        )
        .init();

    let args = Args::parse();

    let records = read_sample_log(&args.csv_file)?;
    if records.is_empty() {
        bail!("no samples in {}", args.csv_file.display());
    }

    if args.accel {
        let samples: Vec<Vector3<f64>> = records.iter().map(|r| r.accel).collect();
        let fit = fit_accel(&samples)?;
        update_json(&args.output_file, |params| fit.apply_to(params))?;

        let r = &fit.report;
        println!("Accelerometer bias: {:?}", fit.bias.as_slice());
        println!("Accelerometer matrix:{}", fit.matrix);
        println!(
            "Iterations: {} (converged: {}), RMS residual: {:.6}, max residual: {:.6}",
            r.iterations, r.converged, r.rms_residual, r.max_abs_residual
        );
        println!("Conditioning: {:.2}", r.conditioning);
        if r.conditioning > POOR_CONDITIONING {
            println!("Warning: samples cover too few orientations, the fit may be unreliable");
        }
    } else {
        let samples: Vec<[f64; 3]> = records.iter().map(|r| [r.gyro.x, r.gyro.y, r.gyro.z]).collect();
        let bias = fit_gyro_bias(&samples)?;
        update_json(&args.output_file, |params| params.gyro_bias = bias)?;
        println!("Gyroscope bias: {:?}", bias.as_slice());
    }

    println!("Calibration saved to {}", args.output_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn mode_flag_is_required() {
        let err = Args::try_parse_from(["airmouse-calibrate", "in.csv", "out.json"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn mode_flags_are_exclusive() {
        let err = Args::try_parse_from([
            "airmouse-calibrate",
            "in.csv",
            "out.json",
            "--accel",
            "--gyro",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn single_mode_parses() {
        let args = Args::try_parse_from(["airmouse-calibrate", "in.csv", "out.json", "--gyro"]).unwrap();
        assert!(args.gyro && !args.accel);
        assert_eq!(args.output_file, PathBuf::from("out.json"));
    }
}
