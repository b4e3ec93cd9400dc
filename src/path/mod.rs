//! Filament path model.
//!
//! A [`Path`] is an ordered, name-unique chain of [`PathItem`]s from the
//! filament supply to the toolhead. Positions are 0-based indices into the
//! chain; `None` stands for "no confirmed filament anywhere".
//!
//! Membership is fixed once the path set is built; only item state (sensor
//! readings, distance history) changes afterwards.

mod item;
mod registry;

use std::collections::BTreeSet;

use crate::app::ports::SensorPort;
use crate::error::{Error, Result};
use crate::sensors::Presence;

pub use item::{HISTORY_LEN, ItemFlags, ItemKind, ItemStatus, PathItem};
pub use registry::{DeviceTable, PathSet};

#[derive(Debug)]
pub struct Path {
    name: String,
    items: Vec<PathItem>,
    max_velocity: Option<f64>,
}

impl Path {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), items: Vec::new(), max_velocity: None }
    }

    pub fn with_max_velocity(mut self, max_velocity: Option<f64>) -> Self {
        self.max_velocity = max_velocity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_velocity(&self) -> Option<f64> {
        self.max_velocity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PathItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&PathItem> {
        self.items.get(index)
    }

    pub(crate) fn into_items(self) -> Vec<PathItem> {
        self.items
    }

    /// Append `item`, followed by the members of a sub-path item.
    ///
    /// All-or-nothing: on a name collision nothing is appended.
    pub fn add(&mut self, mut item: PathItem) -> Result<()> {
        let mut seen: BTreeSet<&str> = self.items.iter().map(PathItem::name).collect();
        let mut incoming = vec![item.name()];
        collect_names(item.nested(), &mut incoming);
        for name in incoming {
            if !seen.insert(name) {
                return Err(Error::config(format!(
                    "'{name}' is already part of path '{}'",
                    self.name
                )));
            }
        }

        let nested = item.take_nested();
        self.items.push(item);
        for sub in nested {
            self.push_flat(sub);
        }
        Ok(())
    }

    fn push_flat(&mut self, mut item: PathItem) {
        let nested = item.take_nested();
        self.items.push(item);
        for sub in nested {
            self.push_flat(sub);
        }
    }

    /// Index of the last sensor in the contiguous run of present readings
    /// that starts at the head of the path.
    ///
    /// An absent reading ends the scan; unknown readings are skipped.
    pub fn find_position(&self, sensors: &impl SensorPort, eventtime: f64) -> Option<usize> {
        let mut pos = None;
        for (i, item) in self.items.iter().enumerate() {
            if !item.has_flag(ItemFlags::SENSOR) {
                continue;
            }
            match item.presence(sensors, eventtime) {
                Presence::Present => pos = Some(i),
                Presence::Absent => break,
                Presence::Unknown => {}
            }
        }
        pos
    }

    /// Every item matching `mask` in `[start, stop)`, in order.
    pub fn find_items(&self, mask: ItemFlags, start: usize, stop: usize) -> Vec<(usize, &PathItem)> {
        let stop = stop.min(self.items.len());
        if start >= stop {
            return Vec::new();
        }
        self.items[start..stop]
            .iter()
            .enumerate()
            .filter(|(_, item)| item.has_flag(mask))
            .map(|(i, item)| (start + i, item))
            .collect()
    }

    /// Highest index `< start` and `>= stop` matching `mask`.
    pub fn find_last(&self, mask: ItemFlags, start: usize, stop: usize) -> Option<(usize, &PathItem)> {
        let start = start.min(self.items.len());
        if start < stop {
            return None;
        }
        self.items[stop..start]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, item)| item.has_flag(mask))
            .map(|(i, item)| (stop + i, item))
    }

    /// Lowest index `>= start` matching `mask`.
    pub fn find_next(&self, mask: ItemFlags, start: usize) -> Option<(usize, &PathItem)> {
        self.items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, item)| item.has_flag(mask))
    }

    pub fn find_object(&self, name: &str) -> Option<(usize, &PathItem)> {
        self.items.iter().enumerate().find(|(_, item)| item.name() == name)
    }

    pub fn record_distance(&mut self, index: usize, distance: f64) {
        if let Some(item) = self.items.get_mut(index) {
            item.record_distance(distance);
        }
    }
}

fn collect_names<'a>(items: &'a [PathItem], out: &mut Vec<&'a str>) {
    for item in items {
        out.push(item.name());
        collect_names(item.nested(), out);
    }
}
