//! KMMS filament path core.
//!
//! Ordered filament paths through sensors and drive actuators, actuator
//! train coordination, the multi-MCU trigger dispatcher and the
//! `load_to` probe move. Hardware, motion planning and the reactor clock
//! are reached through the port traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod actuator;
pub mod adapters;
pub mod app;
pub mod config;
pub mod endstop;
pub mod events;
pub mod path;
pub mod sensors;

mod error;

pub use error::{Error, KmmsError, Result};
