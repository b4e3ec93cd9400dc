//! Sensor subsystem: individual sensor state machines and the aggregating
//! [`SensorHub`].
//!
//! Raw I/O (switch pins, ADC sampling) stays outside the crate; its samples
//! are fed in through [`SensorHub::note_switch`] and
//! [`SensorHub::adc_sample`]. The hub answers presence queries for the path
//! model through the [`SensorPort`] implementation.

pub mod backpressure;
pub mod switch;

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::app::ports::SensorPort;
use crate::config::{BackpressureConfig, SensorConfig};
use crate::error::{Error, Result};
use crate::events::NotificationQueue;
use backpressure::BackpressureSensor;
use switch::SwitchSensor;

/// Tri-state filament reading. `Unknown` is "no information", never absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
    Unknown,
}

impl Presence {
    pub fn is_conclusive(self) -> bool {
        self != Self::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStatus {
    pub filament_detected: bool,
    pub enabled: bool,
    #[serde(flatten)]
    pub pressure: Option<PressureStatus>,
}

impl SensorStatus {
    /// Operator reply for a filament query.
    pub fn describe_filament(&self, name: &str) -> String {
        if self.filament_detected {
            format!("Filament Sensor {name}: filament detected")
        } else {
            format!("Filament Sensor {name}: filament not detected")
        }
    }

    /// Operator reply for a backpressure query; `None` for plain switches.
    pub fn describe_backpressure(&self, name: &str) -> Option<String> {
        let p = self.pressure?;
        Some(format!(
            "Backpressure sensor {name}: FILAMENT_DETECTED={} ENABLED={} MIN={} TARGET={} LAST_VALUE={} PRESSURE={}",
            self.filament_detected, self.enabled, p.min, p.target, p.last_value, p.pressure
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PressureStatus {
    pub min: f64,
    pub target: f64,
    pub last_value: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone)]
enum Sensor {
    Switch(SwitchSensor),
    Backpressure(BackpressureSensor),
}

impl Sensor {
    fn presence(&self) -> Presence {
        match self {
            Self::Switch(s) => s.presence(),
            Self::Backpressure(s) => s.presence(),
        }
    }

    fn status(&self) -> SensorStatus {
        match self {
            Self::Switch(s) => s.status(),
            Self::Backpressure(s) => s.status(),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        match self {
            Self::Switch(s) => s.set_enabled(enabled),
            Self::Backpressure(s) => s.set_enabled(enabled),
        }
    }
}

/// Owns every sensor state machine.
#[derive(Debug, Clone, Default)]
pub struct SensorHub {
    sensors: BTreeMap<String, Sensor>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[SensorConfig]) -> Self {
        let mut hub = Self::new();
        for cfg in configs {
            match cfg.backpressure {
                Some(bp) => hub.add_backpressure(&cfg.name, bp),
                None => hub.add_switch(&cfg.name),
            }
        }
        hub
    }

    pub fn add_switch(&mut self, name: &str) {
        self.sensors.insert(name.to_string(), Sensor::Switch(SwitchSensor::new(name)));
    }

    pub fn add_backpressure(&mut self, name: &str, config: BackpressureConfig) {
        let sensor = BackpressureSensor::new(name, config);
        self.sensors.insert(name.to_string(), Sensor::Backpressure(sensor));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sensors.keys().map(String::as_str)
    }

    /// Host became ready; sensors report changes after `delay` seconds.
    pub fn handle_ready(&mut self, now: f64, delay: f64) {
        for sensor in self.sensors.values_mut() {
            match sensor {
                Sensor::Switch(s) => s.handle_ready(now, delay),
                Sensor::Backpressure(s) => s.handle_ready(now, delay),
            }
        }
    }

    /// Feed a switch edge.
    pub fn note_switch(
        &mut self,
        name: &str,
        present: bool,
        eventtime: f64,
        queue: &mut NotificationQueue,
    ) -> Result<()> {
        match self.sensors.get_mut(name) {
            Some(Sensor::Switch(s)) => {
                s.note_filament_present(present, eventtime, queue);
                Ok(())
            }
            Some(Sensor::Backpressure(_)) => {
                Err(Error::command(format!("'{name}' is an analog sensor")))
            }
            None => Err(unknown(name)),
        }
    }

    /// Feed a normalised ADC sample.
    pub fn adc_sample(
        &mut self,
        name: &str,
        read_time: f64,
        value: f64,
        queue: &mut NotificationQueue,
    ) -> Result<()> {
        match self.sensors.get_mut(name) {
            Some(Sensor::Backpressure(s)) => {
                s.adc_callback(read_time, value, queue);
                Ok(())
            }
            Some(Sensor::Switch(_)) => Err(Error::command(format!("'{name}' is a switch sensor"))),
            None => Err(unknown(name)),
        }
    }
}

fn unknown(name: &str) -> Error {
    Error::command(format!("unknown sensor '{name}'"))
}

impl SensorPort for SensorHub {
    fn presence(&self, name: &str, _eventtime: f64) -> Presence {
        match self.sensors.get(name) {
            Some(sensor) => sensor.presence(),
            None => {
                debug!("Presence query for unknown sensor '{}'", name);
                Presence::Unknown
            }
        }
    }

    fn sensor_status(&self, name: &str, _eventtime: f64) -> Option<SensorStatus> {
        self.sensors.get(name).map(Sensor::status)
    }

    fn set_sensor_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let sensor = self.sensors.get_mut(name).ok_or_else(|| unknown(name))?;
        sensor.set_enabled(enabled);
        Ok(())
    }

    fn configure_backpressure(
        &mut self,
        name: &str,
        min: Option<f64>,
        target: Option<f64>,
    ) -> Result<()> {
        match self.sensors.get_mut(name) {
            Some(Sensor::Backpressure(s)) => {
                s.configure(min, target);
                Ok(())
            }
            Some(Sensor::Switch(_)) => Err(Error::command(format!("'{name}' has no backpressure"))),
            None => Err(unknown(name)),
        }
    }
}
