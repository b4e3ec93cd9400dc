//! Analog backpressure sensor.
//!
//! A normalised ADC reading in `[0, 1]` doubles as a presence switch
//! (`value >= min`) and as a pressure signal (`value - target`). Samples
//! taken before the host is ready are recorded but raise no events.

use log::debug;

use crate::config::BackpressureConfig;
use crate::events::{Notification, NotificationQueue};

use super::switch::SwitchSensor;
use super::{Presence, PressureStatus, SensorStatus};

/// Minimum pressure change that produces a notification.
pub const TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct BackpressureSensor {
    helper: SwitchSensor,
    min: f64,
    target: f64,
    last_value: f64,
    last_pressure: f64,
    min_event_systime: f64,
}

impl BackpressureSensor {
    pub fn new(name: impl Into<String>, config: BackpressureConfig) -> Self {
        Self {
            helper: SwitchSensor::new(name),
            min: config.min.clamp(0.0, 1.0),
            target: config.target.clamp(0.0, 1.0),
            last_value: 0.0,
            last_pressure: 0.0,
            min_event_systime: f64::INFINITY,
        }
    }

    pub fn name(&self) -> &str {
        self.helper.name()
    }

    /// Start producing events `delay` seconds after `now`.
    pub fn handle_ready(&mut self, now: f64, delay: f64) {
        self.min_event_systime = now + delay;
    }

    pub fn adc_callback(&mut self, read_time: f64, value: f64, queue: &mut NotificationQueue) {
        self.last_value = value;
        let pressure = value - self.target;
        if read_time < self.min_event_systime {
            return;
        }

        if self.helper.is_enabled() {
            debug!("{:.1}: adc={:.3} pressure={:.3}", read_time, value, pressure);
        }
        self.helper.note_filament_present(value >= self.min, read_time, queue);

        if (pressure - self.last_pressure).abs() >= TOLERANCE {
            self.last_pressure = pressure;
            if self.helper.is_enabled() {
                queue.push(Notification::Backpressure {
                    name: self.helper.name().to_string(),
                    eventtime: read_time,
                    pressure,
                });
            }
        }
    }

    /// Update thresholds; missing values keep their current setting.
    pub fn configure(&mut self, min: Option<f64>, target: Option<f64>) {
        if let Some(min) = min {
            self.min = min.clamp(0.0, 1.0);
        }
        if let Some(target) = target {
            self.target = target.clamp(0.0, 1.0);
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.helper.set_enabled(enabled);
    }

    pub fn presence(&self) -> Presence {
        self.helper.presence()
    }

    pub fn status(&self) -> SensorStatus {
        SensorStatus {
            pressure: Some(PressureStatus {
                min: round3(self.min),
                target: round3(self.target),
                last_value: round3(self.last_value),
                pressure: round3(self.last_pressure),
            }),
            ..self.helper.status()
        }
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
