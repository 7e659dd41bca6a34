mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Returns the config directory: <platform config dir>/airmouse/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("airmouse");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <platform config dir>/airmouse/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from the default location, or return defaults if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Load config from an explicit path, or return defaults if the file does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        info!(?path, "Loaded config");
        config
    } else {
        info!(?path, "No config found, using defaults");
        AppConfig::default()
    };
    config.validate()?;
    Ok(config)
}

/// Save config to the default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

/// Save config to an explicit path.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    info!(?path, "Saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.imu.lpf_alpha, 0.2);
        assert_eq!(config.mouse.strategy, MotionStrategy::Rate);
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.imu.madgwick_beta = 0.05;
        config.imu.filter_order = FilterOrder::FuseFiltered;
        config.mouse.strategy = MotionStrategy::AngleDelta;
        config.mouse.activation_threshold = Some(1.5);
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.imu.madgwick_beta, 0.05);
        assert_eq!(loaded.imu.filter_order, FilterOrder::FuseFiltered);
        assert_eq!(loaded.mouse.strategy, MotionStrategy::AngleDelta);
        assert_eq!(loaded.mouse.activation_threshold, Some(1.5));
        assert_eq!(loaded.alignment.matrix, config.alignment.matrix);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mouse]\nstrategy = \"angle_delta\"\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.mouse.strategy, MotionStrategy::AngleDelta);
        assert_eq!(loaded.mouse.sensitivity_x, 30.0);
        assert_eq!(loaded.imu.ticks_per_unit, 256.0);
    }

    #[test]
    fn invalid_alpha_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[imu]\nlpf_alpha = 1.5\n").unwrap();

        assert!(load_config_from(&path).is_err());
    }
}
