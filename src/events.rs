//! In-process notification and deferral queues.
//!
//! Notifications are produced by:
//! - sensor state machines (filament inserted / removed, pressure change)
//! - actuator coordination (an actuator became the motion-queue owner)
//!
//! and consumed by the trigger dispatcher while a probe waits, or by the
//! service when it processes its inbox. Deferred work (actuator restoration)
//! goes to the [`IdleQueue`] and only runs once motion has been flushed.
//!
//! Level notifications (pressure, actuator ownership) only matter in their
//! latest form and are coalesced per name. Edge notifications (insert,
//! runout) are never dropped: when the queue is full they evict the oldest
//! level notification, or grow past the cap if there is none.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────────┐
//! │ SensorHub    │────▶│                   │────▶│ TriggerDispatcher    │
//! │ ActuatorBank │────▶│ NotificationQueue │     │ (peeks at inserts)   │
//! │ Reactor      │────▶│  (FIFO, coalesced)│────▶│ KmmsService          │
//! └──────────────┘     └───────────────────┘     │ (everything else)    │
//!                                                └──────────────────────┘
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

use log::warn;

/// Pending notifications before level notifications start being dropped.
const NOTIFICATION_QUEUE_CAP: usize = 64;

/// Asynchronous notifications delivered through the single-threaded queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A sensor started detecting filament.
    FilamentInsert { name: String, eventtime: f64 },
    /// A sensor stopped detecting filament.
    FilamentRunout { name: String, eventtime: f64 },
    /// A backpressure sensor's pressure moved by more than its tolerance.
    Backpressure { name: String, eventtime: f64, pressure: f64 },
    /// An actuator became the motion-queue owner.
    ActuatorActivated { name: String },
}

impl Notification {
    /// Insert and runout: state transitions a consumer must see.
    pub fn is_edge(&self) -> bool {
        matches!(self, Self::FilamentInsert { .. } | Self::FilamentRunout { .. })
    }

    fn supersedes(&self, older: &Notification) -> bool {
        match (self, older) {
            (Self::Backpressure { name: a, .. }, Self::Backpressure { name: b, .. })
            | (Self::ActuatorActivated { name: a }, Self::ActuatorActivated { name: b }) => a == b,
            _ => false,
        }
    }
}

/// FIFO of pending notifications, coalescing level notifications per name.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: VecDeque<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a notification. Returns `false` only when a level notification
    /// was dropped because the queue is full of edges.
    pub fn push(&mut self, note: Notification) -> bool {
        match note {
            Notification::Backpressure { .. } => {
                if let Some(slot) = self.pending.iter_mut().find(|old| note.supersedes(old)) {
                    *slot = note;
                    return true;
                }
            }
            Notification::ActuatorActivated { .. } => {
                // Re-queue at the back so ownership order stays correct.
                self.pending.retain(|old| !note.supersedes(old));
            }
            _ => {}
        }

        if self.pending.len() >= NOTIFICATION_QUEUE_CAP {
            if !note.is_edge() {
                warn!("Notification queue full, dropping {:?}", note);
                return false;
            }
            match self.pending.iter().position(|old| !old.is_edge()) {
                Some(idx) => {
                    if let Some(evicted) = self.pending.remove(idx) {
                        warn!("Notification queue full, evicting {:?}", evicted);
                    }
                }
                None => warn!("Notification queue over capacity ({})", self.pending.len() + 1),
            }
        }
        self.pending.push_back(note);
        true
    }

    /// Pop the oldest notification.
    pub fn pop(&mut self) -> Option<Notification> {
        self.pending.pop_front()
    }

    /// Pending notifications, oldest first, without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.pending.iter()
    }

    /// Drain all pending notifications into a callback, FIFO.
    pub fn drain(&mut self, mut handler: impl FnMut(Notification)) {
        while let Some(note) = self.pending.pop_front() {
            handler(note);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Work that must run at the next idle opportunity, never inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleAction {
    /// Re-activate the path's terminal actuator and re-sync everyone before it.
    RestoreTrain { path: String },
}

/// Deferred-callback queue. Shared by reference so that scope guards can
/// schedule into it while other components are mutably borrowed.
#[derive(Debug, Default)]
pub struct IdleQueue {
    pending: RefCell<VecDeque<IdleAction>>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an action. An identical action that is already pending is
    /// not queued twice.
    pub fn schedule(&self, action: IdleAction) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&action) {
            pending.push_back(action);
        }
    }

    /// Take every pending action, oldest first.
    pub fn take_all(&self) -> Vec<IdleAction> {
        self.pending.borrow_mut().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}
