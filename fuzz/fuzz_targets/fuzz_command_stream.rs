//! Fuzz target: `KmmsService::handle_command`
//!
//! Interprets the input as a JSON array of commands and runs them against a
//! fixed topology on the simulated host. Invariants checked:
//! - No panics for any command sequence
//! - Soft failures never escape the command boundary
//! - The dispatcher is never left armed between commands
//!
//! cargo fuzz run fuzz_command_stream

#![no_main]

use kmms::adapters::sim::{SimBoard, SimHost};
use kmms::app::commands::AppCommand;
use kmms::app::events::AppEvent;
use kmms::app::ports::EventSink;
use kmms::app::service::KmmsService;
use kmms::config::KmmsConfig;
use kmms::path::DeviceTable;
use libfuzzer_sys::fuzz_target;

const TOPOLOGY: &str = r#"{
    "sensor_ready_delay": 0.0,
    "default_path": "spool_0",
    "sensors": [
        {"name": "entry"},
        {"name": "toolhead"},
        {"name": "buffer", "backpressure": {"min": 0.2, "target": 0.5}}
    ],
    "actuators": [{"name": "feeder"}, {"name": "drive"}, {"name": "extruder", "syncing": false}],
    "paths": [
        {"name": "spool_0", "items": ["entry", "feeder", "drive", "buffer", "toolhead", "extruder"]},
        {"name": "short", "items": ["entry", "drive", "toolhead"]}
    ]
}"#;

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(commands) = serde_json::from_slice::<Vec<AppCommand>>(data) else {
        return;
    };
    let config = KmmsConfig::from_json(TOPOLOGY).unwrap();
    let board = SimBoard::new();
    let dispatcher = board.dispatcher(&[("mcu", 0.0)], &config).unwrap();
    let mut host = SimHost::new(&config);
    let registry = DeviceTable::from_config(&config);
    let mut sink = Discard;
    let mut service = KmmsService::new(config, dispatcher).unwrap();
    service.start(&registry, &mut sink).unwrap();
    host.set_switch("entry", true).unwrap();

    for (i, cmd) in commands.into_iter().enumerate() {
        host.schedule_switch(host.now() + 0.5, "toolhead", i % 2 == 0);
        if let Err(e) = service.handle_command(cmd, &mut host, &mut sink) {
            assert!(!e.is_soft(), "soft error escaped: {e}");
        }
        assert!(!board.is_armed(), "dispatcher left armed");
        service.run_idle(&mut host).unwrap();
        service.poll(&mut host, &mut sink);
    }
});
