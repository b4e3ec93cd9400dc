//! One wrapped device within a filament path.

use core::fmt;
use core::ops::BitOr;

use heapless::HistoryBuffer;
use serde::Serialize;

use crate::actuator::ActuatorStatus;
use crate::app::ports::SensorPort;
use crate::sensors::{Presence, SensorStatus};

/// Number of driven distances kept per item.
pub const HISTORY_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Capability flags
// ---------------------------------------------------------------------------

/// Capability bitmask of a [`PathItem`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemFlags(u8);

impl ItemFlags {
    pub const NONE: Self = Self(0);
    pub const SENSOR: Self = Self(1);
    pub const ACTUATOR: Self = Self(2);
    pub const SYNCING_ACTUATOR: Self = Self(4);
    /// A backpressure sensor is always also a sensor.
    pub const BACKPRESSURE: Self = Self(8 | 1);
    pub const SUBPATH: Self = Self(16);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::SENSOR, "sensor"),
        (Self::ACTUATOR, "actuator"),
        (Self::SYNCING_ACTUATOR, "syncing_actuator"),
        (Self(8), "backpressure"),
        (Self::SUBPATH, "subpath"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Superset test: every bit of `mask` must be set.
    pub const fn contains(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.0 & flag.0 != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for ItemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ItemFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemFlags({})", self.names().join("|"))
    }
}

/// Declared device variant. Flags are derived from it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Sensor,
    Backpressure,
    Actuator,
    SyncingActuator,
    SubPath,
}

impl ItemKind {
    pub fn flags(self) -> ItemFlags {
        match self {
            Self::Sensor => ItemFlags::SENSOR,
            Self::Backpressure => ItemFlags::BACKPRESSURE,
            Self::Actuator => ItemFlags::ACTUATOR,
            Self::SyncingActuator => ItemFlags::ACTUATOR | ItemFlags::SYNCING_ACTUATOR,
            Self::SubPath => ItemFlags::SUBPATH,
        }
    }
}

// ---------------------------------------------------------------------------
// PathItem
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct PathItem {
    name: String,
    kind: ItemKind,
    flags: ItemFlags,
    history: HistoryBuffer<f64, HISTORY_LEN>,
    /// Flattened members of a sub-path; moved into the owning path on `add`.
    nested: Vec<PathItem>,
}

impl PathItem {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            kind,
            flags: kind.flags(),
            history: HistoryBuffer::new(),
            nested: Vec::new(),
        }
    }

    /// A sub-path item carrying the already flattened members of that path.
    pub fn subpath(name: impl Into<String>, items: Vec<PathItem>) -> Self {
        let mut item = Self::new(name, ItemKind::SubPath);
        item.nested = items;
        item
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    pub fn has_flag(&self, mask: ItemFlags) -> bool {
        self.flags.contains(mask)
    }

    pub(super) fn nested(&self) -> &[PathItem] {
        &self.nested
    }

    pub(super) fn take_nested(&mut self) -> Vec<PathItem> {
        std::mem::take(&mut self.nested)
    }

    /// Presence reading; items without the sensor capability know nothing.
    pub fn presence(&self, sensors: &impl SensorPort, eventtime: f64) -> Presence {
        if self.has_flag(ItemFlags::SENSOR) {
            sensors.presence(&self.name, eventtime)
        } else {
            Presence::Unknown
        }
    }

    pub fn record_distance(&mut self, distance: f64) {
        self.history.write(distance);
    }

    /// Driven distances, oldest first.
    pub fn history(&self) -> Vec<f64> {
        self.history.oldest_ordered().copied().collect()
    }

    pub fn status(&self, sensors: &impl SensorPort, eventtime: f64) -> ItemStatus {
        let sensor = if self.has_flag(ItemFlags::SENSOR) {
            sensors.sensor_status(&self.name, eventtime)
        } else {
            None
        };
        ItemStatus {
            name: self.name.clone(),
            kind: self.kind,
            flags: self.flags.names(),
            sensor,
            actuator: None,
            history: self.history(),
        }
    }
}

/// Reportable snapshot of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemStatus {
    pub name: String,
    pub kind: ItemKind,
    pub flags: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actuator: Option<ActuatorStatus>,
    pub history: Vec<f64>,
}
