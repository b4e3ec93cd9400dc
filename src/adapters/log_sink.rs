//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade. A console front-end would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Info(text) => {
                for line in text.lines() {
                    info!("REPLY | {}", line);
                }
            }
            AppEvent::Started { path } => {
                info!("START | path={}", path.as_deref().unwrap_or("-"));
            }
            AppEvent::PathSelected { path } => {
                info!("PATH  | selected {}", path);
            }
            AppEvent::ActuatorActivated { name } => {
                info!("DRIVE | active={}", name);
            }
            AppEvent::FilamentInserted { sensor, eventtime } => {
                info!("SENSE | {} insert @ {:.3}", sensor, eventtime);
            }
            AppEvent::FilamentRunout { sensor, eventtime } => {
                info!("SENSE | {} runout @ {:.3}", sensor, eventtime);
            }
            AppEvent::Backpressure { sensor, pressure } => {
                info!("SENSE | {} pressure={:+.3}", sensor, pressure);
            }
            AppEvent::ProbeFinished(report) => match report.endstop_hit() {
                Some(endstop) => info!(
                    "PROBE | {} via {}: hit {} after {:.2}mm (reason={})",
                    report.path,
                    report.driver,
                    endstop,
                    report.distance,
                    report.reason.code()
                ),
                None => warn!(
                    "PROBE | {} via {}: no endstop in {:?} after {:.2}mm (reason={})",
                    report.path,
                    report.driver,
                    report.endstops,
                    report.distance,
                    report.reason.code()
                ),
            },
        }
    }
}
