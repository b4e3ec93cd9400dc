//! Trigger dispatcher ("virtual endstop").
//!
//! Merges several independently clocked sync contexts into one logical
//! "first of N named triggers" completion for the duration of a probe move.
//!
//! ```text
//!            arm(names)                 FilamentInsert{name ∈ names}
//!   Idle ───────────────▶ Armed ───────────────────────────────▶ Resolved
//!    ▲                      │ stop() / re-arm                        │
//!    │                      ▼  (force-resolve with None)             │
//!    └────────────────── stop() ◀───────────────────────────────────┘
//! ```
//!
//! Only one arm record is live at a time. Re-arming force-resolves the
//! previous arm with `None`, so no waiter is ever left on a stale completion.
//! Queued inserts stamped at or before the arm's start are ignored.

pub mod completion;

use std::collections::BTreeSet;

use log::{debug, info, warn};
use serde::Serialize;

use crate::app::ports::{DispatchAggregator, Reactor, SyncContext};
use crate::config::KmmsConfig;
use crate::error::{Error, Result};
use crate::events::{Notification, NotificationQueue};

pub use completion::Completion;

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// Why a sync context stopped. Discriminants are the host protocol codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum StopReason {
    EndstopHit = 1,
    CommsTimeout = 2,
    HostRequest = 3,
    PastEndTime = 4,
}

impl StopReason {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::EndstopHit),
            2 => Some(Self::CommsTimeout),
            3 => Some(Self::HostRequest),
            4 => Some(Self::PastEndTime),
            _ => None,
        }
    }
}

/// Reconcile per-context stop reasons into one outcome.
///
/// Communication timeout beats an endstop hit, which beats everything else;
/// among the rest the highest code wins. `None` for an empty set.
pub fn merge_stop_reasons(reasons: impl IntoIterator<Item = StopReason>) -> Option<StopReason> {
    let mut merged: Option<StopReason> = None;
    for reason in reasons {
        merged = Some(match (merged, reason) {
            (Some(StopReason::CommsTimeout), _) | (_, StopReason::CommsTimeout) => {
                StopReason::CommsTimeout
            }
            (Some(StopReason::EndstopHit), _) | (_, StopReason::EndstopHit) => {
                StopReason::EndstopHit
            }
            (Some(prev), next) => prev.max(next),
            (None, next) => next,
        });
    }
    merged
}

// ---------------------------------------------------------------------------
// Arm results
// ---------------------------------------------------------------------------

/// What resolved an arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A named sensor reported filament.
    Endstop(String),
    /// A sync context halted the arm on its own (e.g. lost contact).
    Halted(StopReason),
}

/// Completion shared between the dispatcher, its contexts and the motion
/// controller. `None` means the arm was force-resolved.
pub type TriggerCompletion = Completion<Option<Trigger>>;

/// Result of [`TriggerDispatcher::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Triggered(Trigger),
    /// Force-resolved (re-arm or stop) before any trigger fired.
    Cancelled,
    /// The deadline passed with the arm still open.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Armed,
    Resolved,
}

struct Arm {
    completion: TriggerCompletion,
    names: BTreeSet<String>,
    /// Host time of the arm's start; earlier inserts belong to someone else.
    not_before: f64,
}

// ---------------------------------------------------------------------------
// TriggerDispatcher
// ---------------------------------------------------------------------------

pub struct TriggerDispatcher {
    contexts: Vec<Box<dyn SyncContext>>,
    aggregator: Box<dyn DispatchAggregator>,
    arm: Option<Arm>,
    running: bool,
    expire_timeout: f64,
}

impl TriggerDispatcher {
    /// Take ownership of the sync contexts and the aggregator.
    pub fn new(
        contexts: Vec<Box<dyn SyncContext>>,
        aggregator: Box<dyn DispatchAggregator>,
        config: &KmmsConfig,
    ) -> Result<Self> {
        if contexts.is_empty() {
            return Err(Error::config("trigger dispatcher needs at least one sync context"));
        }
        let expire_timeout = config.trsync_budget(contexts.len());
        info!(
            "Trigger dispatcher over {} sync context(s), timeout {:.3}s",
            contexts.len(),
            expire_timeout
        );
        Ok(Self { contexts, aggregator, arm: None, running: false, expire_timeout })
    }

    pub fn phase(&self) -> DispatchPhase {
        match &self.arm {
            Some(arm) if self.running && !arm.completion.test() => DispatchPhase::Armed,
            Some(_) if self.running => DispatchPhase::Resolved,
            _ => DispatchPhase::Idle,
        }
    }

    /// Names the live arm listens for.
    pub fn armed_names(&self) -> Option<&BTreeSet<String>> {
        self.arm.as_ref().map(|arm| &arm.names)
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Arm every context against `start_time` for the given trigger names.
    pub fn arm<I, S>(&mut self, start_time: f64, names: I) -> TriggerCompletion
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_resolve();
        if self.running {
            warn!("Re-arming while sync contexts still run, stopping them first");
            self.halt_contexts();
        }

        let completion = TriggerCompletion::new();
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        debug!("Arming at {:.6} for {:?}", start_time, names);

        let not_before = self
            .contexts
            .iter()
            .map(|ctx| ctx.print_time_to_systime(start_time))
            .fold(f64::INFINITY, f64::min);

        let count = self.contexts.len() as f64;
        for (i, ctx) in self.contexts.iter_mut().enumerate() {
            ctx.start(start_time, i as f64 / count, &completion, self.expire_timeout);
        }
        self.aggregator.start(StopReason::HostRequest);
        self.running = true;

        self.arm = Some(Arm { completion: completion.clone(), names, not_before });
        completion
    }

    /// Deliver an "inserted" notification. Returns whether it resolved the arm.
    pub fn note_filament_insert(&self, name: &str) -> bool {
        match &self.arm {
            Some(arm) if arm.names.contains(name) => {
                let won = arm.completion.complete(Some(Trigger::Endstop(name.to_string())));
                if won {
                    debug!("Endstop '{}' triggered", name);
                }
                won
            }
            _ => false,
        }
    }

    /// Tear the arm down and report the merged stop reason.
    pub fn stop(&mut self) -> StopReason {
        self.force_resolve();
        let reason = self.halt_contexts();
        debug!("Dispatcher stopped: {:?}", reason);
        reason
    }

    /// Block until the arm resolves or the host clock reaches the latest
    /// translation of `deadline` (print time) across the contexts.
    ///
    /// Pending `FilamentInsert` notifications raised after the arm's start
    /// are delivered on each wake-up; the inbox itself is left untouched.
    pub fn wait(
        &self,
        reactor: &mut impl Reactor,
        inbox: &mut NotificationQueue,
        deadline: f64,
    ) -> WaitOutcome {
        let Some(arm) = &self.arm else {
            return WaitOutcome::Cancelled;
        };
        let completion = arm.completion.clone();
        let waketime = self
            .contexts
            .iter()
            .map(|ctx| ctx.print_time_to_systime(deadline))
            .fold(f64::NEG_INFINITY, f64::max);

        loop {
            self.deliver(inbox);
            if let Some(result) = completion.result() {
                return match result {
                    Some(trigger) => WaitOutcome::Triggered(trigger),
                    None => WaitOutcome::Cancelled,
                };
            }
            if reactor.monotonic() >= waketime {
                return WaitOutcome::TimedOut;
            }
            reactor.pause(waketime, inbox);
        }
    }

    fn deliver(&self, inbox: &NotificationQueue) {
        let Some(arm) = &self.arm else {
            return;
        };
        for note in inbox.iter() {
            match note {
                Notification::FilamentInsert { name, eventtime } if *eventtime > arm.not_before => {
                    self.note_filament_insert(name);
                }
                Notification::FilamentInsert { name, eventtime } if arm.names.contains(name) => {
                    debug!("Ignoring '{}' insert at {:.6}, armed at {:.6}", name, eventtime, arm.not_before);
                }
                _ => {}
            }
        }
    }

    fn force_resolve(&self) {
        if let Some(arm) = &self.arm {
            if arm.completion.complete(None) {
                debug!("Force-resolved open arm {:?}", arm.names);
            }
        }
    }

    fn halt_contexts(&mut self) -> StopReason {
        self.aggregator.stop();
        let reasons: Vec<StopReason> = self.contexts.iter_mut().map(|ctx| ctx.stop()).collect();
        self.running = false;
        for (ctx, reason) in self.contexts.iter().zip(&reasons) {
            if *reason == StopReason::CommsTimeout {
                warn!("Sync context on '{}' timed out", ctx.mcu_name());
            }
        }
        merge_stop_reasons(reasons).unwrap_or(StopReason::HostRequest)
    }
}
