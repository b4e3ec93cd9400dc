//! Resolution of configured names into paths.
//!
//! Runs once at start-up. Every name in a path's item list is either
//! another configured path (expanded recursively as a sub-path) or a device
//! known to the [`DeviceRegistry`].

use std::collections::BTreeMap;

use log::{debug, info};

use crate::app::ports::DeviceRegistry;
use crate::config::{KmmsConfig, PathConfig};
use crate::error::{Error, Result};

use super::{ItemKind, Path, PathItem};

/// Registry of the devices declared in the configuration.
#[derive(Debug, Default)]
pub struct DeviceTable {
    kinds: BTreeMap<String, ItemKind>,
}

impl DeviceTable {
    pub fn from_config(config: &KmmsConfig) -> Self {
        let mut kinds = BTreeMap::new();
        for sensor in &config.sensors {
            let kind = match sensor.backpressure {
                Some(_) => ItemKind::Backpressure,
                None => ItemKind::Sensor,
            };
            kinds.insert(sensor.name.clone(), kind);
        }
        for actuator in &config.actuators {
            let kind = if actuator.syncing { ItemKind::SyncingActuator } else { ItemKind::Actuator };
            kinds.insert(actuator.name.clone(), kind);
        }
        Self { kinds }
    }

    pub fn insert(&mut self, name: impl Into<String>, kind: ItemKind) {
        self.kinds.insert(name.into(), kind);
    }
}

impl DeviceRegistry for DeviceTable {
    fn lookup(&self, name: &str) -> Option<ItemKind> {
        self.kinds.get(name).copied()
    }
}

/// Every configured path, fully resolved.
#[derive(Debug, Default)]
pub struct PathSet {
    paths: BTreeMap<String, Path>,
}

impl PathSet {
    pub fn build(config: &KmmsConfig, registry: &impl DeviceRegistry) -> Result<Self> {
        let configs: BTreeMap<&str, &PathConfig> =
            config.paths.iter().map(|p| (p.name.as_str(), p)).collect();
        let mut paths = BTreeMap::new();
        for path in &config.paths {
            let mut stack = Vec::new();
            let built = resolve(path, &configs, registry, &mut stack)?;
            info!("Path '{}': {} item(s)", built.name(), built.len());
            paths.insert(path.name.clone(), built);
        }
        Ok(Self { paths })
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.paths.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Path> {
        self.paths.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn resolve<'a>(
    config: &'a PathConfig,
    configs: &BTreeMap<&str, &'a PathConfig>,
    registry: &impl DeviceRegistry,
    stack: &mut Vec<&'a str>,
) -> Result<Path> {
    stack.push(config.name.as_str());
    let mut path = Path::new(config.name.clone()).with_max_velocity(config.max_velocity);
    for name in &config.items {
        let item = if let Some(sub) = configs.get(name.as_str()) {
            if stack.contains(&name.as_str()) {
                return Err(Error::config(format!(
                    "path '{}' includes itself through '{name}'",
                    config.name
                )));
            }
            let nested = resolve(sub, configs, registry, stack)?;
            PathItem::subpath(name.clone(), nested.into_items())
        } else {
            let kind = registry.lookup(name).ok_or_else(|| {
                Error::config(format!("path '{}': unknown object '{name}'", config.name))
            })?;
            PathItem::new(name.clone(), kind)
        };
        debug!("{}: + {} ({:?})", config.name, item.name(), item.kind());
        path.add(item)?;
    }
    stack.pop();
    Ok(path)
}
