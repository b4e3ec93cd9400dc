//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ KmmsService / MoveOrchestrator (domain)
//! ```
//!
//! The motion planner, the reactor clock, raw sensor I/O and the MCU trigger
//! synchronisation all live on the far side of these traits. The domain
//! consumes them through generics at call sites (`hw: &mut (impl SensorPort +
//! MotionPort + Reactor)`), except for the per-MCU sync contexts, which the
//! trigger dispatcher owns as a heterogeneous collection.

use crate::endstop::{StopReason, TriggerCompletion};
use crate::error::Result;
use crate::events::NotificationQueue;
use crate::path::ItemKind;
use crate::sensors::{Presence, SensorStatus};

use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port for filament presence sensors.
pub trait SensorPort {
    /// Tri-state presence reading. A disabled sensor reports
    /// [`Presence::Unknown`]; an unknown name also reports `Unknown`.
    fn presence(&self, name: &str, eventtime: f64) -> Presence;

    /// Full status of one sensor, `None` if no such sensor exists.
    fn sensor_status(&self, name: &str, eventtime: f64) -> Option<SensorStatus>;

    /// Administratively enable or disable a sensor.
    fn set_sensor_enabled(&mut self, name: &str, enabled: bool) -> Result<()>;

    /// Update backpressure thresholds; values are clamped to `[0, 1]`.
    fn configure_backpressure(
        &mut self,
        name: &str,
        min: Option<f64>,
        target: Option<f64>,
    ) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Motion port (driven adapter: domain → motion planner)
// ───────────────────────────────────────────────────────────────

/// The host's motion planner: lookahead queue, step generation, dwell.
pub trait MotionPort {
    /// Commit every pending move and its step generation.
    fn flush_step_generation(&mut self);

    /// Insert a pause of `delay` seconds into the motion timeline.
    fn dwell(&mut self, delay: f64);

    /// Print time at which the last queued move ends.
    fn last_move_time(&mut self) -> f64;

    /// Commanded position `[x, y, z, e]`.
    fn position(&self) -> [f64; 4];

    /// Queue a move that is truncated the instant `stop_on` resolves.
    fn drip_move(&mut self, target: [f64; 4], speed: f64, stop_on: &TriggerCompletion)
    -> Result<()>;

    /// Committed filament position of `actuator` at `print_time`.
    fn find_past_position(&self, actuator: &str, print_time: f64) -> f64;

    /// Make `actuator` the motion-queue owner at `position`.
    fn set_active_actuator(&mut self, actuator: &str, position: f64);

    /// Point `actuator`'s stepper at `queue` (an actuator name, its own name
    /// for its own queue) starting from `position`; `None` detaches it.
    fn bind_motion_queue(&mut self, actuator: &str, queue: Option<&str>, position: f64);
}

// ───────────────────────────────────────────────────────────────
// Reactor (scheduler / clock)
// ───────────────────────────────────────────────────────────────

/// Cooperative scheduler clock.
pub trait Reactor {
    /// Monotonic system time in seconds.
    fn monotonic(&self) -> f64;

    /// Suspend the caller until `waketime`, or earlier when a notification
    /// arrives. Notifications raised meanwhile are appended to `inbox`.
    /// Returns the time at resume.
    fn pause(&mut self, waketime: f64, inbox: &mut NotificationQueue) -> f64;
}

// ───────────────────────────────────────────────────────────────
// Trigger synchronisation (one per MCU clock domain)
// ───────────────────────────────────────────────────────────────

/// One independently clocked hardware channel able to observe a trigger.
pub trait SyncContext {
    /// Identity of the clock domain (MCU name).
    fn mcu_name(&self) -> &str;

    /// Arm the channel from `print_time`. `report_offset` spreads the report
    /// slots of several contexts; the context may resolve `completion` itself
    /// (with [`crate::endstop::Trigger::Halted`]) when it faults.
    fn start(
        &mut self,
        print_time: f64,
        report_offset: f64,
        completion: &TriggerCompletion,
        expire_timeout: f64,
    );

    /// Disarm and report why the channel stopped.
    fn stop(&mut self) -> StopReason;

    /// Translate a print time into system time through this MCU's clock.
    fn print_time_to_systime(&self, print_time: f64) -> f64;
}

/// Fans a trigger in any one context out to all of them.
pub trait DispatchAggregator {
    fn start(&mut self, host_reason: StopReason);
    fn stop(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Named-object registry
// ───────────────────────────────────────────────────────────────

/// Resolves configured device names into their declared kind.
pub trait DeviceRegistry {
    fn lookup(&self, name: &str) -> Option<ItemKind>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / console)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}
