//! Filament switch sensor with runout/insert notifications.
//!
//! Tracks the last reported state and an administrative `enabled` flag.
//! State changes while enabled queue a `FilamentInsert` or `FilamentRunout`
//! notification; while disabled, or before the host is ready, the state is
//! still tracked but nothing is sent. A disabled sensor reads
//! [`Presence::Unknown`].

use log::info;

use crate::events::{Notification, NotificationQueue};

use super::{Presence, SensorStatus};

#[derive(Debug, Clone)]
pub struct SwitchSensor {
    name: String,
    filament_present: bool,
    enabled: bool,
    min_event_systime: f64,
}

impl SwitchSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filament_present: false,
            enabled: true,
            min_event_systime: f64::NEG_INFINITY,
        }
    }

    /// Suppress notifications until `delay` seconds after `now`.
    pub fn handle_ready(&mut self, now: f64, delay: f64) {
        self.min_event_systime = now + delay;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filament_present(&self) -> bool {
        self.filament_present
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Record a new switch state. Returns whether a notification was queued.
    pub fn note_filament_present(
        &mut self,
        present: bool,
        eventtime: f64,
        queue: &mut NotificationQueue,
    ) -> bool {
        if present == self.filament_present {
            return false;
        }
        self.filament_present = present;
        if eventtime < self.min_event_systime || !self.enabled {
            return false;
        }

        let name = self.name.clone();
        let note = if present {
            info!("Filament Sensor {}: insert event detected, Time {:.2}", self.name, eventtime);
            Notification::FilamentInsert { name, eventtime }
        } else {
            info!("Filament Sensor {}: runout event detected, Time {:.2}", self.name, eventtime);
            Notification::FilamentRunout { name, eventtime }
        };
        queue.push(note)
    }

    pub fn presence(&self) -> Presence {
        match (self.enabled, self.filament_present) {
            (false, _) => Presence::Unknown,
            (true, true) => Presence::Present,
            (true, false) => Presence::Absent,
        }
    }

    pub fn status(&self) -> SensorStatus {
        SensorStatus { filament_detected: self.filament_present, enabled: self.enabled, pressure: None }
    }
}
