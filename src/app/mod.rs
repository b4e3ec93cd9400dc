//! Application core: domain logic behind port traits.
//!
//! This module holds the rules of the filament path core: command handling,
//! probe-move orchestration and notification processing. All interaction
//! with the motion planner, the reactor and the sensors happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! against the simulated host.

pub mod commands;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod service;
