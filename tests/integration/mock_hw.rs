//! Test rig: the service wired to the simulated host and board, plus an
//! event sink that records everything it is given.

use kmms::adapters::sim::{SimBoard, SimHost};
use kmms::app::commands::AppCommand;
use kmms::app::events::{AppEvent, ProbeReport};
use kmms::app::ports::EventSink;
use kmms::app::service::KmmsService;
use kmms::config::{ActuatorConfig, BackpressureConfig, KmmsConfig, PathConfig, SensorConfig};
use kmms::path::DeviceTable;

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Info(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_info(&self, needle: &str) -> bool {
        self.infos().iter().any(|text| text.contains(needle))
    }

    pub fn probes(&self) -> Vec<&ProbeReport> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ProbeFinished(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn last_probe(&self) -> ProbeReport {
        self.probes().last().map(|p| (*p).clone()).expect("no probe move reported")
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Configuration ─────────────────────────────────────────────

fn sensor(name: &str) -> SensorConfig {
    SensorConfig { name: name.into(), backpressure: None }
}

fn actuator(name: &str, syncing: bool) -> ActuatorConfig {
    ActuatorConfig { name: name.into(), syncing }
}

fn path(name: &str, items: &[&str]) -> PathConfig {
    PathConfig { name: name.into(), items: items.iter().map(|s| s.to_string()).collect(), max_velocity: None }
}

/// Three paths over one set of devices:
///
/// * `short`  : entry, drive, toolhead
/// * `spool_0`: entry, feeder, drive, buffer, toolhead, extruder
/// * `blind`  : drive, extruder
pub fn test_config() -> KmmsConfig {
    KmmsConfig {
        sensor_ready_delay: 0.0,
        default_path: "short".into(),
        sensors: vec![
            sensor("entry"),
            sensor("toolhead"),
            SensorConfig {
                name: "buffer".into(),
                backpressure: Some(BackpressureConfig { min: 0.2, target: 0.5 }),
            },
        ],
        actuators: vec![actuator("feeder", true), actuator("drive", true), actuator("extruder", false)],
        paths: vec![
            path("short", &["entry", "drive", "toolhead"]),
            path("spool_0", &["entry", "feeder", "drive", "buffer", "toolhead", "extruder"]),
            path("blind", &["drive", "extruder"]),
        ],
        ..KmmsConfig::default()
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub service: KmmsService,
    pub host: SimHost,
    pub board: SimBoard,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_mcus(&[("mcu", 0.0)])
    }

    pub fn with_mcus(mcus: &[(&str, f64)]) -> Self {
        let config = test_config();
        let board = SimBoard::new();
        let dispatcher = board.dispatcher(mcus, &config).unwrap();
        let host = SimHost::new(&config);
        let registry = DeviceTable::from_config(&config);
        let mut sink = RecordingSink::new();
        let mut service = KmmsService::new(config, dispatcher).unwrap();
        service.start(&registry, &mut sink).unwrap();
        Self { service, host, board, sink }
    }

    pub fn run(&mut self, cmd: AppCommand) -> kmms::Result<()> {
        self.service.handle_command(cmd, &mut self.host, &mut self.sink)
    }

    pub fn select(&mut self, path: &str) {
        self.run(AppCommand::SelectPath { name: path.into() }).unwrap();
    }

    /// Run deferred work and collect pending notifications.
    pub fn idle(&mut self) {
        self.service.run_idle(&mut self.host).unwrap();
        self.service.poll(&mut self.host, &mut self.sink);
    }
}
