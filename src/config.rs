//! System configuration parameters
//!
//! Motion constants, sensor and actuator declarations, and the ordered
//! filament paths. Loaded from JSON by the host and validated before any
//! component is built from it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmmsConfig {
    // --- Motion ---
    /// Probe move velocity (mm/s) when a path does not set its own.
    pub max_velocity: f64,
    /// Extra distance of one probe move (mm). Paths carry no geometry, so
    /// every probe uses this constant upper bound.
    pub probe_distance: f64,
    /// Pause (s) between arming the endstops and starting the move.
    pub settle_time: f64,

    // --- Trigger sync ---
    /// Comms timeout budget (s) per sync context when several MCUs take part.
    pub trsync_timeout: f64,
    /// Comms timeout budget (s) when a single MCU takes part.
    pub trsync_single_timeout: f64,

    // --- Sensors ---
    /// Seconds after start-up before sensor changes generate notifications.
    pub sensor_ready_delay: f64,

    // --- Topology ---
    /// Path selected at start-up.
    pub default_path: String,
    pub sensors: Vec<SensorConfig>,
    pub actuators: Vec<ActuatorConfig>,
    pub paths: Vec<PathConfig>,
}

/// A filament presence sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    /// Present when the sensor also reports a continuous pressure signal.
    #[serde(default)]
    pub backpressure: Option<BackpressureConfig>,
}

/// Thresholds of an analog backpressure sensor, both in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Reading at or above which filament counts as present.
    pub min: f64,
    /// Neutral pressure reading.
    pub target: f64,
}

/// A drive actuator (extruder stepper).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub name: String,
    /// Whether the actuator can follow another actuator's motion queue.
    #[serde(default = "default_true")]
    pub syncing: bool,
}

/// One ordered filament route. Items name sensors, actuators or other paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub name: String,
    pub items: Vec<String>,
    #[serde(default)]
    pub max_velocity: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Default for KmmsConfig {
    fn default() -> Self {
        Self {
            // Motion
            max_velocity: 50.0,
            probe_distance: 100.0,
            settle_time: 0.001,

            // Trigger sync
            trsync_timeout: 0.025,
            trsync_single_timeout: 0.250,

            // Sensors
            sensor_ready_delay: 2.0,

            // Topology
            default_path: "spool_0".into(),
            sensors: Vec::new(),
            actuators: Vec::new(),
            paths: Vec::new(),
        }
    }
}

impl KmmsConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject invalid values instead of clamping them.
    pub fn validate(&self) -> Result<()> {
        positive("max_velocity", self.max_velocity)?;
        positive("probe_distance", self.probe_distance)?;
        positive("trsync_timeout", self.trsync_timeout)?;
        positive("trsync_single_timeout", self.trsync_single_timeout)?;
        if !(self.settle_time >= 0.0) {
            return Err(Error::config("settle_time must not be negative"));
        }
        if !(self.sensor_ready_delay >= 0.0) {
            return Err(Error::config("sensor_ready_delay must not be negative"));
        }

        let mut names = BTreeSet::new();
        let declared = self
            .sensors
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.actuators.iter().map(|a| a.name.as_str()))
            .chain(self.paths.iter().map(|p| p.name.as_str()));
        for name in declared {
            if name.trim().is_empty() {
                return Err(Error::config("object names must not be empty"));
            }
            if !names.insert(name) {
                return Err(Error::config(format!("object '{name}' is declared twice")));
            }
        }

        for sensor in &self.sensors {
            if let Some(bp) = sensor.backpressure {
                unit_range(&sensor.name, "min", bp.min)?;
                unit_range(&sensor.name, "target", bp.target)?;
            }
        }

        for path in &self.paths {
            if path.items.is_empty() {
                return Err(Error::config(format!("path '{}' has no items", path.name)));
            }
            if let Some(v) = path.max_velocity {
                positive("max_velocity", v)?;
            }
        }

        if !self.paths.is_empty() && !self.paths.iter().any(|p| p.name == self.default_path) {
            return Err(Error::config(format!(
                "default path '{}' is not configured",
                self.default_path
            )));
        }
        Ok(())
    }

    /// Comms timeout budget for a dispatch over `contexts` sync contexts.
    pub fn trsync_budget(&self, contexts: usize) -> f64 {
        if contexts <= 1 {
            self.trsync_single_timeout
        } else {
            self.trsync_timeout
        }
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::config(format!("{field} must be above 0, got {value}")))
    }
}

fn unit_range(sensor: &str, field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{sensor}: {field} must be within [0, 1], got {value}")))
    }
}
