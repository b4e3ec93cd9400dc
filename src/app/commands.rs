//! Inbound commands to the KMMS service.
//!
//! These represent operator requests (console, macro, scripted run) that the
//! [`KmmsService`](super::service::KmmsService) interprets and acts upon.
//! They deserialize from JSON objects tagged by command name, e.g.
//! `{"command": "KMMS_LOAD_TO", "item": "toolhead"}`.

use serde::Deserialize;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppCommand {
    /// Load the active path up to its toolhead actuator.
    #[serde(rename = "KMMS_PRELOAD")]
    Preload,

    /// Load the active path up to the named item.
    #[serde(rename = "KMMS_LOAD_TO")]
    LoadTo { item: String },

    /// Report every item of the active path.
    #[serde(rename = "KMMS_STATUS")]
    Status,

    /// Make another configured path the active one.
    #[serde(rename = "KMMS_SELECT_PATH")]
    SelectPath { name: String },

    ActivateExtruder { name: String },

    /// Follow `motion_queue`, or detach when it is absent.
    SyncExtruderMotion {
        extruder: String,
        #[serde(default)]
        motion_queue: Option<String>,
    },

    QueryFilamentSensor { name: String },

    SetFilamentSensor {
        name: String,
        #[serde(default = "enable_default")]
        enable: bool,
    },

    /// Adjust backpressure thresholds; absent values are kept.
    SetBackPressure {
        name: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        target: Option<f64>,
        #[serde(default)]
        enable: Option<bool>,
    },

    QueryBackPressure { name: String },
}

fn enable_default() -> bool {
    true
}
