//! Scripted virtual host.
//!
//! [`SimHost`] stands in for the printer host: a virtual clock, a motion
//! queue with one filament axis per actuator queue, and the sensor hub fed
//! from a time-ordered input script. [`SimBoard`] hands out the MCU-side
//! sync contexts and the dispatch aggregator. Every handle it creates shares
//! the board state, so faults can be injected after the handles have been
//! moved into a [`TriggerDispatcher`].
//!
//! Print time and system time coincide on the host clock; each simulated
//! MCU adds its own fixed offset when translating print time.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use log::{debug, warn};
use serde::Deserialize;

use crate::app::ports::{DispatchAggregator, MotionPort, Reactor, SensorPort, SyncContext};
use crate::config::KmmsConfig;
use crate::endstop::{StopReason, Trigger, TriggerCompletion, TriggerDispatcher};
use crate::error::{Error, Result};
use crate::events::NotificationQueue;
use crate::sensors::{Presence, SensorHub, SensorStatus};

// ── Input script ──────────────────────────────────────────────

/// One raw sensor sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimInput {
    Switch { sensor: String, present: bool },
    Adc { sensor: String, value: f64 },
}

/// A sample delivered once the clock reaches `at`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimEvent {
    pub at: f64,
    #[serde(flatten)]
    pub input: SimInput,
}

// ── Motion record ─────────────────────────────────────────────

/// Every motion-port call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionCall {
    Flush,
    Dwell(f64),
    DripMove { queue: String, from: f64, to: f64, speed: f64 },
    SetActive { actuator: String, position: f64 },
    Bind { actuator: String, queue: Option<String>, position: f64 },
}

#[derive(Debug, Clone)]
struct Segment {
    queue: String,
    start: f64,
    end: f64,
    from: f64,
    to: f64,
}

impl Segment {
    fn displacement_at(&self, t: f64) -> f64 {
        if t <= self.start {
            0.0
        } else if t >= self.end {
            self.to - self.from
        } else {
            (self.to - self.from) * (t - self.start) / (self.end - self.start)
        }
    }
}

#[derive(Debug, Clone)]
struct QueueBinding {
    queue: Option<String>,
    anchor: f64,
    since: f64,
}

#[derive(Debug)]
struct Drip {
    segment: usize,
    stop_on: TriggerCompletion,
}

// ───────────────────────────────────────────────────────────────
// SimHost
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SimHost {
    now: f64,
    sensors: SensorHub,
    script: VecDeque<SimEvent>,
    /// Notifications raised outside a pause, handed over on the next one.
    pending: NotificationQueue,

    e: f64,
    queue_end: f64,
    active: Option<String>,
    bindings: BTreeMap<String, QueueBinding>,
    segments: Vec<Segment>,
    drip: Option<Drip>,
    reject_moves: bool,
    calls: Vec<MotionCall>,
}

impl SimHost {
    pub fn new(config: &KmmsConfig) -> Self {
        let mut sensors = SensorHub::from_config(&config.sensors);
        sensors.handle_ready(0.0, config.sensor_ready_delay);
        Self {
            now: 0.0,
            sensors,
            script: VecDeque::new(),
            pending: NotificationQueue::new(),
            e: 0.0,
            queue_end: 0.0,
            active: None,
            bindings: BTreeMap::new(),
            segments: Vec::new(),
            drip: None,
            reject_moves: false,
            calls: Vec::new(),
        }
    }

    // ── Clock ────────────────────────────────────────────────

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Move the clock forward; scripted samples stay queued until the next
    /// pause.
    pub fn advance_to(&mut self, t: f64) {
        self.now = self.now.max(t);
    }

    pub fn next_event_time(&self) -> Option<f64> {
        self.script.front().map(|ev| ev.at)
    }

    // ── Sensors ──────────────────────────────────────────────

    pub fn sensors(&self) -> &SensorHub {
        &self.sensors
    }

    /// Queue a sample for time `at`. Samples at equal times keep their order.
    pub fn schedule(&mut self, at: f64, input: SimInput) {
        let idx = self.script.iter().position(|ev| ev.at > at).unwrap_or(self.script.len());
        self.script.insert(idx, SimEvent { at, input });
    }

    pub fn schedule_switch(&mut self, at: f64, sensor: &str, present: bool) {
        self.schedule(at, SimInput::Switch { sensor: sensor.to_string(), present });
    }

    pub fn schedule_adc(&mut self, at: f64, sensor: &str, value: f64) {
        self.schedule(at, SimInput::Adc { sensor: sensor.to_string(), value });
    }

    /// Flip a switch right now.
    pub fn set_switch(&mut self, sensor: &str, present: bool) -> Result<()> {
        self.sensors.note_switch(sensor, present, self.now, &mut self.pending)
    }

    /// Feed an ADC sample right now.
    pub fn set_adc(&mut self, sensor: &str, value: f64) -> Result<()> {
        self.sensors.adc_sample(sensor, self.now, value, &mut self.pending)
    }

    fn apply(&mut self, input: SimInput, inbox: &mut NotificationQueue) {
        let result = match &input {
            SimInput::Switch { sensor, present } => {
                self.sensors.note_switch(sensor, *present, self.now, inbox)
            }
            SimInput::Adc { sensor, value } => self.sensors.adc_sample(sensor, self.now, *value, inbox),
        };
        if let Err(e) = result {
            warn!("Scripted input at {:.3} ignored: {}", self.now, e);
        }
    }

    // ── Motion inspection ────────────────────────────────────

    pub fn calls(&self) -> &[MotionCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Queue `actuator` is bound to; `None` when detached or never bound.
    pub fn queue_of(&self, actuator: &str) -> Option<&str> {
        self.bindings.get(actuator).and_then(|b| b.queue.as_deref())
    }

    pub fn drip_moves(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, MotionCall::DripMove { .. })).count()
    }

    /// Make every following `drip_move` fail.
    pub fn reject_moves(&mut self, reject: bool) {
        self.reject_moves = reject;
    }

    fn horizon(&self) -> f64 {
        self.queue_end.max(self.now)
    }

    fn displacement(&self, queue: &str, t: f64) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.queue == queue)
            .map(|s| s.displacement_at(t))
            .sum()
    }

    /// Cut the open drip move short once its completion has resolved.
    fn settle_drip(&mut self) {
        let Some(drip) = &self.drip else {
            return;
        };
        if !drip.stop_on.test() {
            return;
        }
        let now = self.now;
        if let Some(seg) = self.segments.get_mut(drip.segment) {
            if now < seg.end {
                let reached = seg.from + seg.displacement_at(now);
                debug!("Drip move on {} stopped at {:.3} (e={:.3})", seg.queue, now, reached);
                seg.end = now.max(seg.start);
                seg.to = reached;
                self.e = reached;
                self.queue_end = seg.end;
            }
        }
        self.drip = None;
    }
}

impl SensorPort for SimHost {
    fn presence(&self, name: &str, eventtime: f64) -> Presence {
        self.sensors.presence(name, eventtime)
    }

    fn sensor_status(&self, name: &str, eventtime: f64) -> Option<SensorStatus> {
        self.sensors.sensor_status(name, eventtime)
    }

    fn set_sensor_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.sensors.set_sensor_enabled(name, enabled)
    }

    fn configure_backpressure(
        &mut self,
        name: &str,
        min: Option<f64>,
        target: Option<f64>,
    ) -> Result<()> {
        self.sensors.configure_backpressure(name, min, target)
    }
}

impl MotionPort for SimHost {
    fn flush_step_generation(&mut self) {
        self.calls.push(MotionCall::Flush);
        self.settle_drip();
        self.queue_end = self.horizon();
    }

    fn dwell(&mut self, delay: f64) {
        self.calls.push(MotionCall::Dwell(delay));
        self.queue_end = self.horizon() + delay;
    }

    fn last_move_time(&mut self) -> f64 {
        self.horizon()
    }

    fn position(&self) -> [f64; 4] {
        [0.0, 0.0, 0.0, self.e]
    }

    fn drip_move(&mut self, target: [f64; 4], speed: f64, stop_on: &TriggerCompletion) -> Result<()> {
        if self.reject_moves {
            return Err(Error::Motion("move rejected by planner".into()));
        }
        let queue = self.active.clone().ok_or_else(|| Error::Motion("no active extruder".into()))?;
        if !(speed > 0.0) {
            return Err(Error::Motion(format!("invalid speed {speed}")));
        }
        let (from, to) = (self.e, target[3]);
        let start = self.horizon();
        let end = start + (to - from).abs() / speed;
        self.calls.push(MotionCall::DripMove { queue: queue.clone(), from, to, speed });
        self.segments.push(Segment { queue, start, end, from, to });
        self.drip = Some(Drip { segment: self.segments.len() - 1, stop_on: stop_on.clone() });
        self.queue_end = end;
        self.e = to;
        Ok(())
    }

    fn find_past_position(&self, actuator: &str, print_time: f64) -> f64 {
        match self.bindings.get(actuator) {
            Some(QueueBinding { queue: Some(queue), anchor, since }) => {
                anchor + self.displacement(queue, print_time) - since
            }
            Some(binding) => binding.anchor,
            None => 0.0,
        }
    }

    fn set_active_actuator(&mut self, actuator: &str, position: f64) {
        self.calls.push(MotionCall::SetActive { actuator: actuator.to_string(), position });
        self.active = Some(actuator.to_string());
        self.e = position;
    }

    fn bind_motion_queue(&mut self, actuator: &str, queue: Option<&str>, position: f64) {
        self.calls.push(MotionCall::Bind {
            actuator: actuator.to_string(),
            queue: queue.map(str::to_string),
            position,
        });
        let since = queue.map_or(0.0, |q| self.displacement(q, self.horizon()));
        self.bindings.insert(
            actuator.to_string(),
            QueueBinding { queue: queue.map(str::to_string), anchor: position, since },
        );
    }
}

impl Reactor for SimHost {
    fn monotonic(&self) -> f64 {
        self.now
    }

    fn pause(&mut self, waketime: f64, inbox: &mut NotificationQueue) -> f64 {
        if !self.pending.is_empty() {
            self.pending.drain(|note| {
                inbox.push(note);
            });
            return self.now;
        }
        match self.script.front().map(|ev| ev.at) {
            Some(at) if at <= waketime => {
                self.now = self.now.max(at);
                while self.script.front().is_some_and(|ev| ev.at <= at) {
                    if let Some(ev) = self.script.pop_front() {
                        self.apply(ev.input, inbox);
                    }
                }
            }
            _ => self.now = self.now.max(waketime),
        }
        self.settle_drip();
        self.now
    }
}

// ───────────────────────────────────────────────────────────────
// SimBoard: simulated MCUs
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct McuState {
    name: String,
    clock_offset: f64,
    completion: Option<TriggerCompletion>,
    report_offset: f64,
    expire_timeout: f64,
    faulted: bool,
}

#[derive(Debug, Default)]
struct BoardState {
    mcus: Vec<McuState>,
    aggregator_running: bool,
    arms: usize,
}

/// Shared state of every simulated MCU and the aggregator.
#[derive(Debug, Clone, Default)]
pub struct SimBoard {
    state: Rc<RefCell<BoardState>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an MCU whose clock runs `clock_offset` seconds ahead of the
    /// host's print time.
    pub fn add_mcu(&self, name: &str, clock_offset: f64) -> Box<dyn SyncContext> {
        let mut state = self.state.borrow_mut();
        state.mcus.push(McuState {
            name: name.to_string(),
            clock_offset,
            completion: None,
            report_offset: 0.0,
            expire_timeout: 0.0,
            faulted: false,
        });
        Box::new(SimTrsync {
            board: self.clone(),
            index: state.mcus.len() - 1,
            name: name.to_string(),
            clock_offset,
        })
    }

    pub fn aggregator(&self) -> Box<dyn DispatchAggregator> {
        Box::new(SimDispatch { board: self.clone() })
    }

    /// A dispatcher over one sync context per `(name, clock_offset)`.
    pub fn dispatcher(&self, mcus: &[(&str, f64)], config: &KmmsConfig) -> Result<TriggerDispatcher> {
        let contexts = mcus.iter().map(|(name, offset)| self.add_mcu(name, *offset)).collect();
        TriggerDispatcher::new(contexts, self.aggregator(), config)
    }

    /// Lose contact with `mcu`. An armed context halts its completion at
    /// once; later arms halt on start until [`clear_faults`](Self::clear_faults).
    pub fn inject_comms_timeout(&self, mcu: &str) {
        let mut state = self.state.borrow_mut();
        for m in state.mcus.iter_mut().filter(|m| m.name == mcu) {
            m.faulted = true;
            if let Some(c) = &m.completion {
                c.complete(Some(Trigger::Halted(StopReason::CommsTimeout)));
            }
        }
    }

    pub fn clear_faults(&self) {
        for m in &mut self.state.borrow_mut().mcus {
            m.faulted = false;
        }
    }

    /// Number of times the aggregator was started.
    pub fn arm_count(&self) -> usize {
        self.state.borrow().arms
    }

    /// Whether any context or the aggregator is still running.
    pub fn is_armed(&self) -> bool {
        let state = self.state.borrow();
        state.aggregator_running || state.mcus.iter().any(|m| m.completion.is_some())
    }

    pub fn report_offsets(&self) -> Vec<f64> {
        self.state.borrow().mcus.iter().map(|m| m.report_offset).collect()
    }

    pub fn expire_timeouts(&self) -> Vec<f64> {
        self.state.borrow().mcus.iter().map(|m| m.expire_timeout).collect()
    }

    pub fn clock_offsets(&self) -> Vec<f64> {
        self.state.borrow().mcus.iter().map(|m| m.clock_offset).collect()
    }
}

struct SimTrsync {
    board: SimBoard,
    index: usize,
    name: String,
    clock_offset: f64,
}

impl SyncContext for SimTrsync {
    fn mcu_name(&self) -> &str {
        &self.name
    }

    fn start(
        &mut self,
        _print_time: f64,
        report_offset: f64,
        completion: &TriggerCompletion,
        expire_timeout: f64,
    ) {
        let mut state = self.board.state.borrow_mut();
        let Some(mcu) = state.mcus.get_mut(self.index) else {
            return;
        };
        mcu.completion = Some(completion.clone());
        mcu.report_offset = report_offset;
        mcu.expire_timeout = expire_timeout;
        if mcu.faulted {
            completion.complete(Some(Trigger::Halted(StopReason::CommsTimeout)));
        }
    }

    fn stop(&mut self) -> StopReason {
        let mut state = self.board.state.borrow_mut();
        let Some(mcu) = state.mcus.get_mut(self.index) else {
            return StopReason::HostRequest;
        };
        let result = mcu.completion.take().and_then(|c| c.result());
        if mcu.faulted {
            StopReason::CommsTimeout
        } else if matches!(result, Some(Some(Trigger::Endstop(_)))) {
            StopReason::EndstopHit
        } else {
            StopReason::HostRequest
        }
    }

    fn print_time_to_systime(&self, print_time: f64) -> f64 {
        print_time + self.clock_offset
    }
}

struct SimDispatch {
    board: SimBoard,
}

impl DispatchAggregator for SimDispatch {
    fn start(&mut self, _host_reason: StopReason) {
        let mut state = self.board.state.borrow_mut();
        state.aggregator_running = true;
        state.arms += 1;
    }

    fn stop(&mut self) {
        self.board.state.borrow_mut().aggregator_running = false;
    }
}
