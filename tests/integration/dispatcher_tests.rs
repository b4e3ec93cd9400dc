//! Trigger dispatcher over several simulated MCUs.

use kmms::adapters::sim::{SimBoard, SimHost};
use kmms::app::ports::Reactor;
use kmms::endstop::{DispatchPhase, StopReason, Trigger, WaitOutcome};
use kmms::events::NotificationQueue;

use crate::mock_hw::test_config;

#[test]
fn contexts_share_report_slots_and_budget() {
    let config = test_config();

    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0), ("toolboard", 0.05)], &config).unwrap();
    dispatcher.arm(0.0, ["toolhead"]);
    assert_eq!(board.report_offsets(), vec![0.0, 0.5]);
    assert_eq!(board.expire_timeouts(), vec![0.025, 0.025]);

    let single = SimBoard::new();
    let mut dispatcher = single.dispatcher(&[("mcu", 0.0)], &config).unwrap();
    dispatcher.arm(0.0, ["toolhead"]);
    assert_eq!(single.expire_timeouts(), vec![0.250]);
}

#[test]
fn dispatcher_needs_a_context() {
    let board = SimBoard::new();
    assert!(board.dispatcher(&[], &test_config()).is_err());
}

#[test]
fn rearm_cancels_previous_waiter() {
    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0)], &test_config()).unwrap();

    let first = dispatcher.arm(0.0, ["toolhead"]);
    let second = dispatcher.arm(1.0, ["buffer"]);

    assert_eq!(first.result(), Some(None), "stale arm is force-resolved");
    assert!(!second.test());
    assert!(!first.same_as(&second));
    assert_eq!(board.arm_count(), 2);

    assert!(!dispatcher.note_filament_insert("toolhead"), "old names no longer listen");
    assert!(dispatcher.note_filament_insert("buffer"));
    assert_eq!(second.result(), Some(Some(Trigger::Endstop("buffer".into()))));
    assert_eq!(dispatcher.phase(), DispatchPhase::Resolved);
}

#[test]
fn wait_deadline_uses_slowest_clock() {
    let config = test_config();
    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0), ("toolboard", 0.3)], &config).unwrap();
    let mut host = SimHost::new(&config);
    let mut inbox = NotificationQueue::new();

    dispatcher.arm(0.0, ["toolhead"]);
    let outcome = dispatcher.wait(&mut host, &mut inbox, 1.0);

    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert!((host.monotonic() - 1.3).abs() < 1e-9);
    assert_eq!(dispatcher.stop(), StopReason::HostRequest);
    assert_eq!(dispatcher.phase(), DispatchPhase::Idle);
}

#[test]
fn wait_resolves_on_armed_insert_only() {
    let config = test_config();
    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0)], &config).unwrap();
    let mut host = SimHost::new(&config);
    let mut inbox = NotificationQueue::new();

    host.schedule_switch(0.2, "entry", true);
    host.schedule_switch(0.4, "toolhead", true);
    dispatcher.arm(0.0, ["toolhead"]);

    let outcome = dispatcher.wait(&mut host, &mut inbox, 5.0);
    assert_eq!(outcome, WaitOutcome::Triggered(Trigger::Endstop("toolhead".into())));
    assert!((host.monotonic() - 0.4).abs() < 1e-9);
    assert_eq!(inbox.len(), 2, "notifications stay queued for the service");
    assert_eq!(dispatcher.stop(), StopReason::EndstopHit);
}

#[test]
fn lost_mcu_halts_the_arm() {
    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0), ("toolboard", 0.0)], &test_config()).unwrap();

    let completion = dispatcher.arm(0.0, ["toolhead"]);
    board.inject_comms_timeout("toolboard");

    assert_eq!(completion.result(), Some(Some(Trigger::Halted(StopReason::CommsTimeout))));
    assert!(!dispatcher.note_filament_insert("toolhead"), "first resolution wins");
    assert_eq!(dispatcher.stop(), StopReason::CommsTimeout);
    assert!(!board.is_armed());
}

#[test]
fn stop_when_idle_is_harmless() {
    let board = SimBoard::new();
    let mut dispatcher = board.dispatcher(&[("mcu", 0.0)], &test_config()).unwrap();
    assert_eq!(dispatcher.phase(), DispatchPhase::Idle);
    assert_eq!(dispatcher.stop(), StopReason::HostRequest);
    let mut host = SimHost::new(&test_config());
    let mut inbox = NotificationQueue::new();
    assert_eq!(dispatcher.wait(&mut host, &mut inbox, 1.0), WaitOutcome::Cancelled);
}
