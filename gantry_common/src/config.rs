//! TOML machine configuration with validation.
//!
//! The hard real-time constants (segment timing, queue sizing) are
//! compile-time [`crate::consts`]; the config file describes the machine
//! itself; per-axis ceilings and the step scaling the simulation and
//! kinematics layers use.
//!
//! Loading is two-phase: parse, then bounds-check with descriptive
//! errors. `load_from_str` exists so tests can exercise validation
//! without touching the filesystem.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::consts::AXES;

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),
    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Parameter validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

/// Per-axis machine description.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Axis name ("x", "y", ...), for logs and reports.
    pub name: String,
    /// Maximum velocity [mm/s].
    pub max_velocity: f64,
    /// Maximum jerk [mm/s³].
    pub max_jerk: f64,
    /// Motor step scaling [steps/mm].
    pub steps_per_unit: f64,
}

/// Whole-machine description.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// One entry per logical axis, in axis order.
    pub axis: Vec<AxisConfig>,
}

impl MachineConfig {
    /// Validate parameter bounds and axis count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axis.len() != AXES {
            return Err(ConfigError::Validation(format!(
                "expected {} axis entries, found {}",
                AXES,
                self.axis.len()
            )));
        }
        for ax in &self.axis {
            if !(ax.max_velocity > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "axis {}: max_velocity must be positive",
                    ax.name
                )));
            }
            if !(ax.max_jerk > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "axis {}: max_jerk must be positive",
                    ax.name
                )));
            }
            if !(ax.steps_per_unit > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "axis {}: steps_per_unit must be positive",
                    ax.name
                )));
            }
        }
        Ok(())
    }

    /// The smallest per-axis jerk ceiling; the conservative default for
    /// a coordinated move when the caller does not scale by direction.
    pub fn min_jerk(&self) -> f64 {
        self.axis
            .iter()
            .map(|a| a.max_jerk)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Load and validate a machine config from a TOML file.
pub fn load_config(path: &Path) -> Result<MachineConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&text)
}

/// Load and validate a machine config from a TOML string (for testing).
pub fn load_config_from_str(text: &str) -> Result<MachineConfig, ConfigError> {
    let config: MachineConfig =
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"
        [[axis]]
        name = "x"
        max_velocity = 500.0
        max_jerk = 20000000.0
        steps_per_unit = 80.0

        [[axis]]
        name = "y"
        max_velocity = 500.0
        max_jerk = 20000000.0
        steps_per_unit = 80.0

        [[axis]]
        name = "z"
        max_velocity = 20.0
        max_jerk = 500000.0
        steps_per_unit = 400.0

        [[axis]]
        name = "a"
        max_velocity = 100.0
        max_jerk = 5000000.0
        steps_per_unit = 93.0
    "#;

    #[test]
    fn good_config_loads() {
        let cfg = load_config_from_str(GOOD).unwrap();
        assert_eq!(cfg.axis.len(), AXES);
        assert_eq!(cfg.axis[2].name, "z");
        assert!((cfg.min_jerk() - 500_000.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_axis_count_rejected() {
        let text = r#"
            [[axis]]
            name = "x"
            max_velocity = 500.0
            max_jerk = 20000000.0
            steps_per_unit = 80.0
        "#;
        let err = load_config_from_str(text).unwrap_err();
        assert!(err.to_string().contains("axis entries"));
    }

    #[test]
    fn non_positive_jerk_rejected() {
        let text = GOOD.replace("max_jerk = 500000.0", "max_jerk = 0.0");
        let err = load_config_from_str(&text).unwrap_err();
        assert!(err.to_string().contains("max_jerk"));
    }

    #[test]
    fn file_roundtrip() {
        use std::io::Write as _;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(GOOD.as_bytes()).unwrap();
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.axis[0].name, "x");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/gantry.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
