//! KMMS simulator: Main Entry Point
//!
//! Runs the filament path core against the scripted virtual host.
//!
//! ```text
//! kmms-sim <config.json> <script.json>
//! ```
//!
//! The script lists the simulated MCUs, timed sensor samples and the
//! commands to execute:
//!
//! ```text
//! {
//!   "mcus":     [{"name": "mcu", "clock_offset": 0.0}],
//!   "events":   [{"at": 2.4, "kind": "switch", "sensor": "toolhead", "present": true}],
//!   "commands": [{"command": "KMMS_PRELOAD"}, {"command": "KMMS_STATUS"}]
//! }
//! ```
#![deny(unused_must_use)]

use std::fs;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde::Deserialize;

use kmms::adapters::log_sink::LogEventSink;
use kmms::adapters::sim::{SimBoard, SimEvent, SimHost};
use kmms::app::commands::AppCommand;
use kmms::app::service::KmmsService;
use kmms::config::KmmsConfig;
use kmms::path::DeviceTable;

#[derive(Debug, Deserialize)]
struct McuSpec {
    name: String,
    #[serde(default)]
    clock_offset: f64,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    mcus: Vec<McuSpec>,
    #[serde(default)]
    events: Vec<SimEvent>,
    commands: Vec<AppCommand>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(script_path)) = (args.next(), args.next()) else {
        bail!("usage: kmms-sim <config.json> <script.json>");
    };

    let text = fs::read_to_string(&config_path).with_context(|| format!("reading {config_path}"))?;
    let config = KmmsConfig::from_json(&text).with_context(|| format!("loading {config_path}"))?;
    let text = fs::read_to_string(&script_path).with_context(|| format!("reading {script_path}"))?;
    let script: Script =
        serde_json::from_str(&text).with_context(|| format!("parsing {script_path}"))?;

    info!("KMMS simulator v{}", env!("CARGO_PKG_VERSION"));

    // ── Wiring ────────────────────────────────────────────────
    let board = SimBoard::new();
    let mcus: Vec<(&str, f64)> = if script.mcus.is_empty() {
        vec![("mcu", 0.0)]
    } else {
        script.mcus.iter().map(|m| (m.name.as_str(), m.clock_offset)).collect()
    };
    let dispatcher = board.dispatcher(&mcus, &config)?;

    let ready = config.sensor_ready_delay;
    let mut host = SimHost::new(&config);
    for event in script.events {
        host.schedule(event.at, event.input);
    }

    let mut sink = LogEventSink::new();
    let registry = DeviceTable::from_config(&config);
    let mut service = KmmsService::new(config, dispatcher)?;
    service.start(&registry, &mut sink)?;

    // ── Command loop ──────────────────────────────────────────
    // Commands are accepted once the sensors report.
    host.advance_to(ready);
    for cmd in script.commands {
        if let Err(e) = service.handle_command(cmd, &mut host, &mut sink) {
            warn!("Command failed: {}", e);
        }
        service.run_idle(&mut host)?;
        service.poll(&mut host, &mut sink);
    }

    // Play out whatever the script still holds.
    while let Some(at) = host.next_event_time() {
        host.advance_to(at);
        service.poll(&mut host, &mut sink);
    }

    info!("Simulation finished at t={:.3}", host.now());
    Ok(())
}
