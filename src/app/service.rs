//! KMMS service: the hexagonal core.
//!
//! [`KmmsService`] owns the resolved paths, the actuator bank, the trigger
//! dispatcher and the in-process queues. It exposes a hardware-agnostic API;
//! all I/O flows through port traits injected at call sites, so the whole
//! service is testable against the simulated host.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                 │       KmmsService         │
//!  MotionPort ◀──│ Paths · Actuators · Probe │
//!     Reactor ◀──└──────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::actuator::ActuatorBank;
use crate::config::KmmsConfig;
use crate::endstop::TriggerDispatcher;
use crate::error::{Error, KmmsError, Result};
use crate::events::{IdleAction, IdleQueue, Notification, NotificationQueue};
use crate::path::{ItemFlags, Path, PathSet};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::orchestrator::{MoveOrchestrator, MoveSettings, restore_train};
use super::ports::{DeviceRegistry, EventSink, MotionPort, Reactor, SensorPort};

// ───────────────────────────────────────────────────────────────
// KmmsService
// ───────────────────────────────────────────────────────────────

pub struct KmmsService {
    config: KmmsConfig,
    paths: PathSet,
    active_path: Option<String>,
    actuators: ActuatorBank,
    endstop: TriggerDispatcher,
    inbox: NotificationQueue,
    idle: IdleQueue,
}

impl KmmsService {
    /// Construct the service from a validated configuration.
    ///
    /// Paths are resolved later, in [`start`](Self::start).
    pub fn new(config: KmmsConfig, endstop: TriggerDispatcher) -> Result<Self> {
        config.validate()?;
        let actuators = ActuatorBank::from_config(&config.actuators);
        Ok(Self {
            config,
            paths: PathSet::default(),
            active_path: None,
            actuators,
            endstop,
            inbox: NotificationQueue::new(),
            idle: IdleQueue::new(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Resolve every configured path and select the default one.
    pub fn start(&mut self, registry: &impl DeviceRegistry, sink: &mut impl EventSink) -> Result<()> {
        self.paths = PathSet::build(&self.config, registry)?;
        self.active_path = self
            .paths
            .contains(&self.config.default_path)
            .then(|| self.config.default_path.clone());
        match &self.active_path {
            Some(path) => info!("KMMS started, active path '{}'", path),
            None => warn!("KMMS started without any filament path"),
        }
        sink.emit(&AppEvent::Started { path: self.active_path.clone() });
        Ok(())
    }

    // ── Command handling ──────────────────────────────────────

    /// Execute one command.
    ///
    /// Soft KMMS failures are reported through the sink as text; command,
    /// configuration and motion errors propagate to the caller.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl SensorPort + MotionPort + Reactor),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        debug!("Command {:?}", cmd);
        match self.dispatch(cmd, hw, sink) {
            Err(Error::Kmms(e)) => {
                warn!("KMMS Error: {}", e);
                sink.emit(&AppEvent::Info(format!("KMMS Error: {e}")));
                Ok(())
            }
            other => other,
        }
    }

    fn dispatch(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl SensorPort + MotionPort + Reactor),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match cmd {
            AppCommand::Preload => {
                self.orchestrator()?.move_to_toolhead(hw, sink)?;
            }
            AppCommand::LoadTo { item } => {
                let mut orchestrator = self.orchestrator()?;
                let (index, _) = orchestrator
                    .path
                    .find_object(&item)
                    .ok_or(KmmsError::UnknownItem { name: item.clone() })?;
                orchestrator.load_to(index, hw, sink)?;
            }
            AppCommand::Status => {
                let report = self.status_report(&*hw, hw.monotonic())?;
                sink.emit(&AppEvent::Info(report));
            }
            AppCommand::SelectPath { name } => {
                if !self.paths.contains(&name) {
                    return Err(Error::command(format!("unknown filament path '{name}'")));
                }
                info!("Selecting path '{}'", name);
                self.active_path = Some(name.clone());
                sink.emit(&AppEvent::PathSelected { path: name });
            }
            AppCommand::ActivateExtruder { name } => {
                self.actuators.activate(&name, hw, &mut self.inbox)?;
            }
            AppCommand::SyncExtruderMotion { extruder, motion_queue } => match motion_queue {
                Some(leader) => self.actuators.sync(&extruder, &leader, hw)?,
                None => self.actuators.desync(&extruder, hw)?,
            },
            AppCommand::QueryFilamentSensor { name } => {
                let status = hw
                    .sensor_status(&name, hw.monotonic())
                    .ok_or_else(|| Error::command(format!("unknown sensor '{name}'")))?;
                sink.emit(&AppEvent::Info(status.describe_filament(&name)));
            }
            AppCommand::SetFilamentSensor { name, enable } => {
                hw.set_sensor_enabled(&name, enable)?;
            }
            AppCommand::SetBackPressure { name, min, target, enable } => {
                hw.configure_backpressure(&name, min, target)?;
                if let Some(enable) = enable {
                    hw.set_sensor_enabled(&name, enable)?;
                }
                self.reply_backpressure(&name, &*hw, sink)?;
            }
            AppCommand::QueryBackPressure { name } => {
                self.reply_backpressure(&name, &*hw, sink)?;
            }
        }
        Ok(())
    }

    fn orchestrator(&mut self) -> Result<MoveOrchestrator<'_>> {
        let name = self.active_path.as_deref().ok_or_else(|| Error::command("no filament path selected"))?;
        let path = self
            .paths
            .get_mut(name)
            .ok_or_else(|| Error::command("no filament path selected"))?;
        Ok(MoveOrchestrator {
            path,
            actuators: &mut self.actuators,
            endstop: &mut self.endstop,
            inbox: &mut self.inbox,
            idle: &self.idle,
            settings: MoveSettings::from(&self.config),
        })
    }

    fn reply_backpressure(
        &self,
        name: &str,
        hw: &(impl SensorPort + Reactor),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let text = hw
            .sensor_status(name, hw.monotonic())
            .and_then(|status| status.describe_backpressure(name))
            .ok_or_else(|| Error::command(format!("'{name}' is not a backpressure sensor")))?;
        sink.emit(&AppEvent::Info(text));
        Ok(())
    }

    /// One JSON line per item of the active path.
    fn status_report(&self, sensors: &impl SensorPort, eventtime: f64) -> Result<String> {
        let path = self.active_path().ok_or_else(|| Error::command("no filament path selected"))?;
        let mut lines = vec![format!("KMMS {}:", path.name())];
        for item in path.items() {
            let mut status = item.status(sensors, eventtime);
            if item.has_flag(ItemFlags::ACTUATOR) {
                status.actuator = self.actuators.get(item.name()).map(|a| a.status());
            }
            let json = serde_json::to_string(&status)
                .map_err(|e| Error::command(format!("status of '{}': {e}", item.name())))?;
            lines.push(format!("    {json}"));
        }
        Ok(lines.join("\n"))
    }

    // ── Idle processing ───────────────────────────────────────

    /// Collect notifications raised since the last call and report them.
    pub fn poll(&mut self, hw: &mut impl Reactor, sink: &mut impl EventSink) {
        let now = hw.monotonic();
        hw.pause(now, &mut self.inbox);
        self.process_notifications(sink);
    }

    /// Report every queued notification.
    pub fn process_notifications(&mut self, sink: &mut impl EventSink) {
        self.inbox.drain(|note| {
            let event = match note {
                Notification::FilamentInsert { name, eventtime } => {
                    AppEvent::FilamentInserted { sensor: name, eventtime }
                }
                Notification::FilamentRunout { name, eventtime } => {
                    AppEvent::FilamentRunout { sensor: name, eventtime }
                }
                Notification::Backpressure { name, pressure, .. } => {
                    AppEvent::Backpressure { sensor: name, pressure }
                }
                Notification::ActuatorActivated { name } => AppEvent::ActuatorActivated { name },
            };
            sink.emit(&event);
        });
    }

    /// Run deferred work. Motion is flushed first so no reconfiguration
    /// happens while moves are still in flight.
    pub fn run_idle(&mut self, hw: &mut impl MotionPort) -> Result<()> {
        if self.idle.is_empty() {
            return Ok(());
        }
        hw.flush_step_generation();
        for action in self.idle.take_all() {
            match action {
                IdleAction::RestoreTrain { path } => {
                    let path = self
                        .paths
                        .get(&path)
                        .ok_or_else(|| Error::config(format!("unknown filament path '{path}'")))?;
                    restore_train(path, &mut self.actuators, hw, &mut self.inbox)?;
                }
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn active_path(&self) -> Option<&Path> {
        self.active_path.as_deref().and_then(|name| self.paths.get(name))
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    pub fn actuators(&self) -> &ActuatorBank {
        &self.actuators
    }

    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.endstop
    }

    pub fn pending_idle(&self) -> usize {
        self.idle.len()
    }

    pub fn config(&self) -> &KmmsConfig {
        &self.config
    }
}
