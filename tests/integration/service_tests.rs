//! Command handling, status reporting and notification routing.

use kmms::Error;
use kmms::actuator::Binding;
use kmms::app::commands::AppCommand;
use kmms::app::events::AppEvent;
use kmms::app::ports::SensorPort;
use kmms::sensors::Presence;

use crate::mock_hw::Rig;

#[test]
fn start_selects_default_path() {
    let rig = Rig::new();
    assert_eq!(rig.sink.events.first(), Some(&AppEvent::Started { path: Some("short".into()) }));
    assert_eq!(rig.service.active_path().map(|p| p.name()), Some("short"));
    assert_eq!(rig.service.paths().len(), 3);
    assert_eq!(rig.service.dispatcher().context_count(), 1);
}

#[test]
fn select_path() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    assert!(rig.sink.events.contains(&AppEvent::PathSelected { path: "spool_0".into() }));
    assert_eq!(rig.service.active_path().map(|p| p.len()), Some(6));

    let result = rig.run(AppCommand::SelectPath { name: "spool_9".into() });
    assert!(matches!(result, Err(Error::Command(_))));
    assert_eq!(rig.service.active_path().map(|p| p.name()), Some("spool_0"));
}

#[test]
fn status_lists_every_item() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    rig.run(AppCommand::ActivateExtruder { name: "drive".into() }).unwrap();
    rig.run(AppCommand::Status).unwrap();

    let report = *rig.sink.infos().last().unwrap();
    let mut lines = report.lines();
    assert_eq!(lines.next(), Some("KMMS spool_0:"));
    let items: Vec<serde_json::Value> =
        lines.map(|l| serde_json::from_str(l.trim()).unwrap()).collect();
    assert_eq!(items.len(), 6);
    assert_eq!(items[0]["name"], "entry");
    assert_eq!(items[0]["kind"], "sensor");
    assert_eq!(items[0]["filament_detected"], serde_json::Value::Null);
    assert_eq!(items[0]["sensor"]["enabled"], true);
    assert_eq!(items[2]["actuator"]["active"], true);
    assert_eq!(items[3]["flags"], serde_json::json!(["sensor", "backpressure"]));
    assert_eq!(items[3]["sensor"]["target"], 0.5);
    assert_eq!(items[5]["kind"], "actuator");
    assert_eq!(items[5]["actuator"]["active"], false);
}

#[test]
fn filament_sensor_queries() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.run(AppCommand::QueryFilamentSensor { name: "entry".into() }).unwrap();
    assert!(rig.sink.has_info("Filament Sensor entry: filament detected"));

    rig.run(AppCommand::SetFilamentSensor { name: "entry".into(), enable: false }).unwrap();
    assert_eq!(rig.host.presence("entry", 0.0), Presence::Unknown);

    let result = rig.run(AppCommand::QueryFilamentSensor { name: "ghost".into() });
    assert!(matches!(result, Err(Error::Command(_))));
}

#[test]
fn backpressure_thresholds_are_clamped() {
    let mut rig = Rig::new();
    rig.run(AppCommand::SetBackPressure {
        name: "buffer".into(),
        min: Some(2.0),
        target: None,
        enable: Some(false),
    })
    .unwrap();
    assert!(rig.sink.has_info("Backpressure sensor buffer: FILAMENT_DETECTED=false ENABLED=false MIN=1 TARGET=0.5"));

    let result = rig.run(AppCommand::QueryBackPressure { name: "entry".into() });
    assert!(matches!(result, Err(Error::Command(_))));
}

#[test]
fn extruder_sync_commands() {
    let mut rig = Rig::new();
    rig.run(AppCommand::ActivateExtruder { name: "drive".into() }).unwrap();
    assert_eq!(rig.host.active(), Some("drive"));

    let result = rig.run(AppCommand::SyncExtruderMotion {
        extruder: "drive".into(),
        motion_queue: Some("feeder".into()),
    });
    assert_eq!(result, Err(Error::Command("Cannot set sync while 'drive' is active".into())));

    rig.run(AppCommand::SyncExtruderMotion { extruder: "feeder".into(), motion_queue: Some("drive".into()) })
        .unwrap();
    assert_eq!(rig.host.queue_of("feeder"), Some("drive"));
    assert_eq!(
        rig.service.actuators().get("feeder").map(|a| a.binding().clone()),
        Some(Binding::Following("drive".into()))
    );

    rig.run(AppCommand::SyncExtruderMotion { extruder: "feeder".into(), motion_queue: None }).unwrap();
    assert_eq!(rig.host.queue_of("feeder"), None);

    let result = rig.run(AppCommand::SyncExtruderMotion {
        extruder: "extruder".into(),
        motion_queue: Some("drive".into()),
    });
    assert!(matches!(result, Err(Error::Command(_))), "extruder cannot follow");
}

#[test]
fn notifications_become_events() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.set_adc("buffer", 0.7).unwrap();
    rig.service.poll(&mut rig.host, &mut rig.sink);

    assert!(rig.sink.events.contains(&AppEvent::FilamentInserted { sensor: "entry".into(), eventtime: 0.0 }));
    assert!(rig.sink.events.contains(&AppEvent::FilamentInserted { sensor: "buffer".into(), eventtime: 0.0 }));
    let pressure = rig.sink.events.iter().find_map(|e| match e {
        AppEvent::Backpressure { sensor, pressure } if sensor == "buffer" => Some(*pressure),
        _ => None,
    });
    assert!(pressure.is_some_and(|p| (p - 0.2).abs() < 1e-9));

    rig.host.advance_to(3.0);
    rig.host.set_switch("entry", false).unwrap();
    rig.service.poll(&mut rig.host, &mut rig.sink);
    assert!(rig.sink.events.contains(&AppEvent::FilamentRunout { sensor: "entry".into(), eventtime: 3.0 }));
}

#[test]
fn commands_parse_from_json() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_switch(0.1, "toolhead", true);
    let cmd: AppCommand = serde_json::from_str(r#"{"command":"KMMS_LOAD_TO","item":"toolhead"}"#).unwrap();
    rig.run(cmd).unwrap();
    assert_eq!(rig.sink.last_probe().endstop_hit(), Some("toolhead"));
}
