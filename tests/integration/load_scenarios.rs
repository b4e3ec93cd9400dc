//! End-to-end probe moves through the command boundary.

use kmms::Error;
use kmms::adapters::sim::MotionCall;
use kmms::app::commands::AppCommand;
use kmms::app::events::AppEvent;
use kmms::endstop::{StopReason, Trigger};

use crate::mock_hw::Rig;

fn load_to(item: &str) -> AppCommand {
    AppCommand::LoadTo { item: item.into() }
}

// ── Probe hits the primary endstop ───────────────────────────

#[test]
fn probe_stops_on_toolhead_insert() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_switch(0.5, "toolhead", true);

    rig.run(load_to("toolhead")).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.path, "short");
    assert_eq!(probe.driver, "drive");
    assert_eq!(probe.endstops, ["toolhead"]);
    assert_eq!(probe.endstop_hit(), Some("toolhead"));
    assert_eq!(probe.reason, StopReason::EndstopHit);
    // Move starts after the 1 ms settle dwell at 50 mm/s and is cut at 0.5 s.
    assert!((probe.distance - 24.95).abs() < 1e-6, "distance {}", probe.distance);

    assert_eq!(rig.host.drip_moves(), 1);
    assert_eq!(rig.board.arm_count(), 1);
    assert!(!rig.board.is_armed(), "dispatcher must be torn down");
    assert_eq!(rig.service.pending_idle(), 1, "restoration is deferred");

    rig.idle();
    assert_eq!(rig.service.pending_idle(), 0);
    assert_eq!(rig.service.actuators().active(), Some("drive"));
    assert_eq!(rig.host.active(), Some("drive"));
    assert!(rig.sink.events.contains(&AppEvent::ActuatorActivated { name: "drive".into() }));

    let path = rig.service.active_path().unwrap();
    let (_, drive) = path.find_object("drive").unwrap();
    assert_eq!(drive.history(), vec![probe.distance]);
    let bank = rig.service.actuators();
    assert!((bank.get("drive").unwrap().last_position() - 24.95).abs() < 1e-6);
}

#[test]
fn empty_path_is_reported_without_motion() {
    let mut rig = Rig::new();
    // "entry" reads absent: nothing upstream of the drive.
    rig.run(load_to("toolhead")).unwrap();

    assert!(rig.sink.has_info("KMMS Error: path seems to be empty"));
    assert_eq!(rig.host.drip_moves(), 0);
    assert_eq!(rig.board.arm_count(), 0);
    assert_eq!(rig.service.pending_idle(), 0);
    assert!(rig.sink.probes().is_empty());
}

#[test]
fn present_primary_endstop_short_circuits() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    rig.host.set_switch("entry", true).unwrap();
    rig.host.set_adc("buffer", 0.6).unwrap();
    rig.host.set_switch("toolhead", true).unwrap();

    rig.run(AppCommand::Preload).unwrap();

    assert!(rig.sink.has_info("spool_0 seems to be at toolhead"));
    assert_eq!(rig.host.drip_moves(), 0);
    assert_eq!(rig.board.arm_count(), 0);
    assert!(
        !rig.host.calls().iter().any(|c| matches!(c, MotionCall::Bind { .. })),
        "no actuator may be re-synced"
    );
    assert_eq!(rig.service.pending_idle(), 0);
}

#[test]
fn filament_already_past_target() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.set_switch("toolhead", true).unwrap();

    rig.run(load_to("toolhead")).unwrap();

    assert!(rig.sink.has_info("short is already at toolhead"));
    assert_eq!(rig.host.drip_moves(), 0);
    assert_eq!(rig.service.pending_idle(), 0);
}

// ── Actuator train ───────────────────────────────────────────

#[test]
fn preload_drives_train_and_restores_toolhead_extruder() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_adc(1.0, "buffer", 0.6);

    rig.run(AppCommand::Preload).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.driver, "drive");
    assert_eq!(probe.endstops, ["buffer", "toolhead"]);
    assert_eq!(probe.endstop_hit(), Some("buffer"));
    assert_eq!(rig.host.queue_of("feeder"), Some("drive"), "upstream feeder follows the driver");

    rig.idle();
    assert_eq!(rig.service.actuators().active(), Some("extruder"));
    assert_eq!(rig.host.active(), Some("extruder"));
    assert_eq!(rig.host.queue_of("drive"), Some("extruder"));
    assert_eq!(rig.host.queue_of("feeder"), Some("extruder"));
}

#[test]
fn restoration_flushes_motion_first() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_adc(0.2, "buffer", 0.9);
    rig.run(AppCommand::Preload).unwrap();

    rig.host.clear_calls();
    rig.idle();
    assert_eq!(rig.host.calls().first(), Some(&MotionCall::Flush));
    assert!(rig.host.calls().contains(&MotionCall::SetActive { actuator: "extruder".into(), position: 0.0 }));
}

// ── Failure paths ────────────────────────────────────────────

#[test]
fn probe_without_trigger_runs_full_distance() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();

    rig.run(load_to("toolhead")).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.trigger, None);
    assert_eq!(probe.reason, StopReason::HostRequest);
    assert!((probe.distance - 100.0).abs() < 1e-6);
    assert!((rig.host.now() - 2.001).abs() < 1e-9);
    assert_eq!(rig.service.pending_idle(), 1);
}

#[test]
fn comms_timeout_is_a_soft_error() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.board.inject_comms_timeout("mcu");

    rig.run(load_to("toolhead")).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.reason, StopReason::CommsTimeout);
    assert_eq!(probe.trigger, Some(Trigger::Halted(StopReason::CommsTimeout)));
    assert!(rig.sink.has_info("KMMS Error: communication timeout during probe move"));
    assert!(!rig.board.is_armed());
    assert_eq!(rig.service.pending_idle(), 1, "no retry, restoration still runs");
    assert_eq!(rig.host.drip_moves(), 1);
}

#[test]
fn rejected_move_propagates_and_still_restores() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.reject_moves(true);

    let result = rig.run(load_to("toolhead"));

    assert!(matches!(result, Err(Error::Motion(_))));
    assert!(!rig.board.is_armed());
    assert_eq!(rig.service.pending_idle(), 1);
    assert!(rig.sink.probes().is_empty());
}

#[test]
fn unknown_target_is_a_soft_error() {
    let mut rig = Rig::new();
    rig.run(load_to("nowhere")).unwrap();
    assert!(rig.sink.has_info("KMMS Error: 'nowhere' is not part of the active path"));
}

#[test]
fn path_without_sensors_cannot_probe() {
    let mut rig = Rig::new();
    rig.select("blind");
    rig.run(AppCommand::Preload).unwrap();
    assert!(rig.sink.has_info("KMMS Error: blind does not have any sensors before target configured"));
    assert_eq!(rig.board.arm_count(), 0);
}

#[test]
fn second_probe_appends_history() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_switch(0.5, "toolhead", true);
    rig.run(load_to("toolhead")).unwrap();
    rig.idle();

    rig.host.set_switch("toolhead", false).unwrap();
    let at = rig.host.now() + 1.0;
    rig.host.schedule_switch(at, "toolhead", true);
    rig.run(load_to("toolhead")).unwrap();

    let path = rig.service.active_path().unwrap();
    let (_, drive) = path.find_object("drive").unwrap();
    assert_eq!(drive.history().len(), 2);
    assert_eq!(rig.board.arm_count(), 2);
}

// ── Stale and busy inboxes ───────────────────────────────────

#[test]
fn insert_from_before_the_move_is_ignored() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    // A bounce on the toolhead switch before the command.
    rig.host.set_switch("toolhead", true).unwrap();
    rig.host.set_switch("toolhead", false).unwrap();

    rig.run(load_to("toolhead")).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.trigger, None, "stale insert must not resolve the arm");
    assert!((probe.distance - 100.0).abs() < 1e-6, "distance {}", probe.distance);
    assert!((rig.host.now() - 2.001).abs() < 1e-9);
}

#[test]
fn back_to_back_probes_without_idle() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.schedule_switch(0.5, "toolhead", true);
    rig.run(load_to("toolhead")).unwrap();
    assert_eq!(rig.sink.last_probe().endstop_hit(), Some("toolhead"));

    // The first insert is still queued: no idle, no poll in between.
    rig.host.set_switch("toolhead", false).unwrap();
    let at = rig.host.now() + 1.0;
    rig.host.schedule_switch(at, "toolhead", true);
    rig.run(load_to("toolhead")).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.endstop_hit(), Some("toolhead"));
    assert!(probe.distance > 40.0, "second move must travel, got {}", probe.distance);
    assert!((rig.host.now() - at).abs() < 1e-9);
    assert_eq!(rig.board.arm_count(), 2);
    assert_eq!(rig.service.pending_idle(), 1);

    let path = rig.service.active_path().unwrap();
    let (_, drive) = path.find_object("drive").unwrap();
    assert_eq!(drive.history().len(), 2);
}

#[test]
fn repeated_load_at_target_never_moves() {
    let mut rig = Rig::new();
    rig.host.set_switch("entry", true).unwrap();
    rig.host.set_switch("toolhead", true).unwrap();

    rig.run(load_to("toolhead")).unwrap();
    rig.run(load_to("toolhead")).unwrap();

    let repeats = rig.sink.infos().iter().filter(|i| i.contains("short is already at toolhead")).count();
    assert_eq!(repeats, 2);
    assert_eq!(rig.host.drip_moves(), 0);
    assert_eq!(rig.board.arm_count(), 0);
    assert_eq!(rig.service.pending_idle(), 0);
}

#[test]
fn busy_pressure_stream_does_not_hide_the_endstop() {
    let mut rig = Rig::new();
    rig.select("spool_0");
    rig.host.set_switch("entry", true).unwrap();
    for i in 0..80u32 {
        let value = if i % 2 == 0 { 0.05 } else { 0.15 };
        rig.host.schedule_adc(f64::from(i) * 0.005, "buffer", value);
    }
    rig.host.schedule_switch(1.0, "toolhead", true);

    rig.run(AppCommand::Preload).unwrap();

    let probe = rig.sink.last_probe();
    assert_eq!(probe.endstop_hit(), Some("toolhead"));
    assert!((rig.host.now() - 1.0).abs() < 1e-9);

    rig.idle();
    assert!(rig.sink.events.contains(&AppEvent::FilamentInserted { sensor: "toolhead".into(), eventtime: 1.0 }));
    let pressure_events = rig
        .sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::Backpressure { sensor, .. } if sensor == "buffer"))
        .count();
    assert_eq!(pressure_events, 1, "pressure updates coalesce");
}
