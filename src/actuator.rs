//! Actuator coordination.
//!
//! Exactly one actuator owns the motion queue at a time ([`Binding::Active`]).
//! Any other actuator either runs on its own queue while idle, follows the
//! queue of another actuator, or is detached from motion entirely. Because
//! the binding is a single enum, an active actuator can never also follow.
//!
//! Every state change first flushes pending step generation so the new
//! binding takes effect at a deterministic boundary.

use std::collections::BTreeMap;

use log::info;
use serde::Serialize;

use crate::app::ports::MotionPort;
use crate::config::ActuatorConfig;
use crate::error::{Error, Result};
use crate::events::{Notification, NotificationQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Owns the motion queue.
    Active,
    /// On its own queue, not the owner.
    Idle,
    /// Stepping along with the named actuator's queue.
    Following(String),
    /// Parked at position 0 with no queue.
    Detached,
}

#[derive(Debug, Clone)]
pub struct Actuator {
    name: String,
    last_position: f64,
    syncing: bool,
    binding: Binding,
}

impl Actuator {
    pub fn new(name: impl Into<String>, syncing: bool) -> Self {
        Self { name: name.into(), last_position: 0.0, syncing, binding: Binding::Idle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn can_sync(&self) -> bool {
        self.syncing
    }

    pub fn status(&self) -> ActuatorStatus {
        ActuatorStatus {
            active: self.binding == Binding::Active,
            following: match &self.binding {
                Binding::Following(leader) => Some(leader.clone()),
                _ => None,
            },
            last_position: self.last_position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<String>,
    pub last_position: f64,
}

/// All configured actuators plus the current queue owner.
#[derive(Debug, Default)]
pub struct ActuatorBank {
    actuators: BTreeMap<String, Actuator>,
    active: Option<String>,
}

impl ActuatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[ActuatorConfig]) -> Self {
        let mut bank = Self::new();
        for cfg in configs {
            bank.insert(Actuator::new(cfg.name.clone(), cfg.syncing));
        }
        bank
    }

    pub fn insert(&mut self, actuator: Actuator) {
        self.actuators.insert(actuator.name.clone(), actuator);
    }

    pub fn get(&self, name: &str) -> Option<&Actuator> {
        self.actuators.get(name)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.as_deref() == Some(name)
    }

    pub fn set_last_position(&mut self, name: &str, position: f64) {
        if let Some(a) = self.actuators.get_mut(name) {
            a.last_position = position;
        }
    }

    /// Make `name` the motion-queue owner. Returns `false` if it already was.
    pub fn activate(
        &mut self,
        name: &str,
        motion: &mut impl MotionPort,
        inbox: &mut NotificationQueue,
    ) -> Result<bool> {
        let position = self.lookup(name)?.last_position;
        if self.is_active(name) {
            info!("Extruder {} already active", name);
            return Ok(false);
        }

        info!("Activating extruder {}", name);
        motion.flush_step_generation();
        if let Some(prev) = self.active.take() {
            if let Some(a) = self.actuators.get_mut(&prev) {
                a.binding = Binding::Idle;
            }
        }

        motion.bind_motion_queue(name, Some(name), position);
        motion.set_active_actuator(name, position);
        if let Some(a) = self.actuators.get_mut(name) {
            a.binding = Binding::Active;
        }
        self.active = Some(name.to_string());
        inbox.push(Notification::ActuatorActivated { name: name.to_string() });

        // Followers of the new owner pick up its current position.
        for follower in self.actuators.values() {
            if follower.binding == Binding::Following(name.to_string()) {
                motion.bind_motion_queue(&follower.name, Some(name), position);
            }
        }
        Ok(true)
    }

    /// Bind `follower` to `leader`'s motion queue at the leader's position.
    pub fn sync(&mut self, follower: &str, leader: &str, motion: &mut impl MotionPort) -> Result<()> {
        motion.flush_step_generation();
        let f = self.lookup(follower)?;
        if f.binding == Binding::Active {
            return Err(Error::command(format!("Cannot set sync while '{follower}' is active")));
        }
        if !f.syncing {
            return Err(Error::command(format!("'{follower}' cannot follow another extruder")));
        }
        if follower == leader {
            return Err(Error::command(format!("'{follower}' cannot follow itself")));
        }
        let position = self
            .actuators
            .get(leader)
            .map(|l| l.last_position)
            .ok_or_else(|| Error::command(format!("'{leader}' is not a valid extruder.")))?;

        info!("Syncing extruder {} to {}", follower, leader);
        motion.bind_motion_queue(follower, Some(leader), position);
        if let Some(a) = self.actuators.get_mut(follower) {
            a.binding = Binding::Following(leader.to_string());
        }
        Ok(())
    }

    /// Release `name` from any motion queue, parking it at position 0.
    pub fn desync(&mut self, name: &str, motion: &mut impl MotionPort) -> Result<()> {
        motion.flush_step_generation();
        if self.lookup(name)?.binding == Binding::Active {
            return Err(Error::command(format!("Cannot set sync while '{name}' is active")));
        }
        info!("Desyncing extruder {}", name);
        motion.bind_motion_queue(name, None, 0.0);
        if let Some(a) = self.actuators.get_mut(name) {
            a.binding = Binding::Detached;
        }
        Ok(())
    }

    /// Activate `driver` and make every follower step along with it, in order.
    pub fn activate_train(
        &mut self,
        driver: &str,
        followers: &[&str],
        motion: &mut impl MotionPort,
        inbox: &mut NotificationQueue,
    ) -> Result<()> {
        self.activate(driver, motion, inbox)?;
        for follower in followers.iter().filter(|f| **f != driver) {
            self.sync(follower, driver, motion)?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&Actuator> {
        self.actuators
            .get(name)
            .ok_or_else(|| Error::command(format!("'{name}' is not a valid extruder.")))
    }
}
