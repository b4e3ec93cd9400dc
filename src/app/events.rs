//! Outbound application events.
//!
//! The [`KmmsService`](super::service::KmmsService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them: log them, print them to a console, forward
//! them to a front-end.

use crate::endstop::{StopReason, Trigger};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Operator-facing text (command replies, soft errors).
    Info(String),

    /// The service has started; carries the selected path, if any.
    Started { path: Option<String> },

    /// Another path became the active one.
    PathSelected { path: String },

    /// An actuator became the motion-queue owner.
    ActuatorActivated { name: String },

    FilamentInserted { sensor: String, eventtime: f64 },

    FilamentRunout { sensor: String, eventtime: f64 },

    Backpressure { sensor: String, pressure: f64 },

    /// A probe move finished (triggered, timed out or cancelled).
    ProbeFinished(ProbeReport),
}

/// Outcome of one probe move.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub path: String,
    pub driver: String,
    pub endstops: Vec<String>,
    /// Filament driven by the driving actuator (mm).
    pub distance: f64,
    /// What resolved the arm; `None` when nothing fired before the deadline.
    pub trigger: Option<Trigger>,
    pub reason: StopReason,
}

impl ProbeReport {
    pub fn endstop_hit(&self) -> Option<&str> {
        match &self.trigger {
            Some(Trigger::Endstop(name)) => Some(name),
            _ => None,
        }
    }
}
