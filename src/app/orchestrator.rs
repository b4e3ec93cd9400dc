//! Probe-move orchestration (`load_to` / `move_to_toolhead`).
//!
//! ```text
//!  find_position ─▶ driver / endstops ─▶ train ─▶ arm ─▶ drip_move
//!                                                          │
//!        restore (idle) ◀── report ◀── stop ◀── wait ◀─────┘
//! ```
//!
//! Once the actuator train has been touched, leaving `load_to` by any route
//! (success, error, panic) schedules the path's default train for the next
//! idle slot. Restoration never runs inline: it happens after the service
//! has flushed every in-flight motion command.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::actuator::ActuatorBank;
use crate::config::KmmsConfig;
use crate::endstop::{StopReason, Trigger, TriggerDispatcher, WaitOutcome};
use crate::error::{Error, KmmsError, Result};
use crate::events::{IdleAction, IdleQueue, NotificationQueue};
use crate::path::{ItemFlags, Path};
use crate::sensors::Presence;

use super::events::{AppEvent, ProbeReport};
use super::ports::{EventSink, MotionPort, Reactor, SensorPort};

/// Motion constants of a probe move.
#[derive(Debug, Clone, Copy)]
pub struct MoveSettings {
    pub max_velocity: f64,
    pub probe_distance: f64,
    pub settle_time: f64,
}

impl From<&KmmsConfig> for MoveSettings {
    fn from(config: &KmmsConfig) -> Self {
        Self {
            max_velocity: config.max_velocity,
            probe_distance: config.probe_distance,
            settle_time: config.settle_time,
        }
    }
}

/// Schedules the path's default train on drop.
struct RestoreGuard<'a> {
    idle: &'a IdleQueue,
    path: String,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        debug!("Scheduling actuator restoration for '{}'", self.path);
        self.idle.schedule(IdleAction::RestoreTrain { path: self.path.clone() });
    }
}

/// Borrows everything one probe move touches.
pub struct MoveOrchestrator<'a> {
    pub path: &'a mut Path,
    pub actuators: &'a mut ActuatorBank,
    pub endstop: &'a mut TriggerDispatcher,
    pub inbox: &'a mut NotificationQueue,
    pub idle: &'a IdleQueue,
    pub settings: MoveSettings,
}

impl MoveOrchestrator<'_> {
    /// Load up to the path's terminal actuator.
    pub fn move_to_toolhead(
        &mut self,
        hw: &mut (impl SensorPort + MotionPort + Reactor),
        sink: &mut impl EventSink,
    ) -> Result<bool> {
        let Some((toolhead, _)) = self.path.find_last(ItemFlags::ACTUATOR, self.path.len(), 0) else {
            return Err(if self.path.is_empty() {
                Error::command("no filament path selected")
            } else {
                Error::config(format!(
                    "Path '{}' does not have toolhead extruder configured",
                    self.path.name()
                ))
            });
        };
        self.load_to(toolhead, hw, sink)
    }

    /// Advance filament until the last sensor at or before `stop_index` fires.
    ///
    /// Returns `false` when filament already sits at or beyond `stop_index`,
    /// `true` when it is at the target (already, or after the probe move).
    pub fn load_to(
        &mut self,
        stop_index: usize,
        hw: &mut (impl SensorPort + MotionPort + Reactor),
        sink: &mut impl EventSink,
    ) -> Result<bool> {
        if self.path.is_empty() {
            return Err(Error::command("no filament path selected"));
        }
        let path_name = self.path.name().to_string();
        let target = self
            .path
            .get(stop_index)
            .map(|item| item.name().to_string())
            .ok_or_else(|| Error::command(format!("{path_name} has no item at {stop_index}")))?;

        let now = hw.monotonic();
        let pos = self.path.find_position(&*hw, now);
        if pos.is_some_and(|p| p >= stop_index) {
            info!("{} is already at {}", path_name, target);
            sink.emit(&AppEvent::Info(format!("{path_name} is already at {target}")));
            return Ok(false);
        }

        let (driver_idx, driver) = self
            .path
            .find_last(ItemFlags::ACTUATOR, stop_index, 0)
            .map(|(i, item)| (i, item.name().to_string()))
            .ok_or_else(|| {
                Error::config(format!("Path '{path_name}' does not have any extruders before '{target}'"))
            })?;

        if pos.is_none() {
            let confirmed = self
                .path
                .find_items(ItemFlags::SENSOR, 0, driver_idx)
                .iter()
                .any(|(_, item)| item.presence(&*hw, now).is_conclusive());
            if confirmed {
                return Err(KmmsError::PathEmpty.into());
            }
            warn!("{}: no sensor before '{}' confirms filament, loading anyway", path_name, driver);
        }

        let (primary_idx, primary) = self
            .path
            .find_last(ItemFlags::SENSOR, stop_index + 1, 0)
            .map(|(i, item)| (i, item.name().to_string()))
            .ok_or_else(|| KmmsError::NoSensors { path: path_name.clone() })?;

        let mut endstops: BTreeSet<String> = self
            .path
            .find_items(ItemFlags::BACKPRESSURE, driver_idx + 1, stop_index)
            .iter()
            .map(|(_, item)| item.name().to_string())
            .collect();
        endstops.insert(primary.clone());

        if self.path.items()[primary_idx].presence(&*hw, now) == Presence::Present {
            info!("{} seems to be at {}", path_name, primary);
            sink.emit(&AppEvent::Info(format!("{path_name} seems to be at {primary}")));
            return Ok(true);
        }

        // From here on the train is touched; always restore it.
        let _restore = RestoreGuard { idle: self.idle, path: path_name.clone() };

        let followers: Vec<String> = self
            .path
            .find_items(ItemFlags::ACTUATOR, 0, stop_index)
            .iter()
            .map(|(_, item)| item.name().to_string())
            .filter(|name| *name != driver)
            .collect();
        let followers: Vec<&str> = followers.iter().map(String::as_str).collect();
        self.actuators.activate_train(&driver, &followers, hw, self.inbox)?;

        hw.flush_step_generation();
        let start_time = hw.last_move_time();
        let completion = self.endstop.arm(start_time, endstops.iter().cloned());
        let initial = hw.find_past_position(&driver, start_time);
        hw.dwell(self.settings.settle_time);

        let mut goal = hw.position();
        goal[3] += self.settings.probe_distance;
        let speed = self.path.max_velocity().unwrap_or(self.settings.max_velocity);
        info!("KMMS: Moving to '{}' with {} at {:.1} mm/s", primary, driver, speed);
        sink.emit(&AppEvent::Info(format!("KMMS: Moving to '{primary}'")));

        if let Err(e) = hw.drip_move(goal, speed, &completion) {
            self.endstop.stop();
            hw.flush_step_generation();
            return Err(e);
        }
        let deadline = hw.last_move_time();
        let outcome = self.endstop.wait(hw, self.inbox, deadline);

        let reason = self.endstop.stop();
        hw.flush_step_generation();

        let end_time = hw.last_move_time();
        let final_position = hw.find_past_position(&driver, end_time);
        let distance = final_position - initial;
        self.path.record_distance(driver_idx, distance);
        self.actuators.set_last_position(&driver, final_position);

        let trigger = match outcome {
            WaitOutcome::Triggered(trigger) => Some(trigger),
            WaitOutcome::Cancelled | WaitOutcome::TimedOut => None,
        };
        info!("KMMS: Moved {:.1} mm, hit {:?} endstop ({:?})", distance, trigger, reason);
        let report = ProbeReport {
            path: path_name,
            driver,
            endstops: endstops.into_iter().collect(),
            distance,
            trigger,
            reason,
        };
        sink.emit(&AppEvent::ProbeFinished(report.clone()));

        if reason == StopReason::CommsTimeout
            || report.trigger == Some(Trigger::Halted(StopReason::CommsTimeout))
        {
            return Err(KmmsError::CommsTimeout.into());
        }
        Ok(true)
    }
}

/// Reactivate the path's terminal actuator and re-sync every actuator
/// before it.
pub fn restore_train(
    path: &Path,
    actuators: &mut ActuatorBank,
    motion: &mut impl MotionPort,
    inbox: &mut NotificationQueue,
) -> Result<()> {
    let mut train: Vec<&str> = path
        .find_items(ItemFlags::ACTUATOR, 0, path.len())
        .iter()
        .map(|(_, item)| item.name())
        .collect();
    let terminal = train.pop().ok_or_else(|| {
        Error::config(format!("Path '{}' does not have toolhead extruder configured", path.name()))
    })?;
    info!("Restoring actuator train of '{}' on {}", path.name(), terminal);
    actuators.activate_train(terminal, &train, motion, inbox)
}
