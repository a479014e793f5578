//! Controller-registered telemetry triggers.
//!
//! Every trigger owns a periodic timer task. The task only holds the trigger
//! id and weak references, and looks the trigger up again on every tick, so a
//! trigger removed in between is simply skipped.

use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use lvap_common::EtherAddress;
use lvap_wire::{
    BusynessTriggerFired, FrameRecord, Message, ResourceElement, RssiTriggerFired, Summary,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::{frame::RxFrame, AddOutcome};

mod kind;
pub use kind::{
    BusynessCondition, Edge, RssiCondition, SummaryState, Trigger, TriggerKind, MIN_PERIOD,
};

/// Telemetry and outbound path a trigger is evaluated against.
pub trait TriggerContext: Send + Sync + 'static {
    fn wtp(&self) -> EtherAddress;

    /// Smoothed RSSI of `sta` and the radio it was measured on.
    fn rssi(&self, sta: EtherAddress) -> Option<(i8, ResourceElement)>;

    /// Averaged channel busyness of a radio.
    fn busyness(&self, iface: usize) -> Option<u32>;

    fn resource(&self, iface: usize) -> Option<ResourceElement>;

    /// Hands a report to the controller connection. Must not block.
    fn report(&self, message: Message);
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The trigger is still registered.
    Continue,
    /// The trigger is gone; its timer should stop.
    Stop,
}

/// Table of registered triggers and their timers.
#[derive(Debug, Default)]
pub struct TriggerEngine {
    triggers: RwLock<FxHashMap<u32, Trigger>>,
    timers: Mutex<FxHashMap<u32, JoinHandle<()>>>,
    /// Whether any summary trigger is registered, checked on the packet path.
    summaries: AtomicBool,
}

impl TriggerEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trigger.
    ///
    /// Adding an id that is already registered replaces its condition and
    /// re-arms it. Adding a condition identical to a registered one re-arms
    /// that one instead. Neither case creates a second instance.
    pub fn add(self: &Arc<Self>, trigger: Trigger, ctx: Weak<dyn TriggerContext>) -> AddOutcome {
        let id = trigger.id;
        let period = trigger.period;

        let restart = {
            let mut triggers = self.triggers.write();

            if let Some(existing) = triggers.get_mut(&id) {
                let restart = existing.period != period;
                *existing = trigger;
                existing.rearm();
                self.refresh(&triggers);
                debug!(id, "trigger re-armed");
                if !restart {
                    return AddOutcome::Rearmed(id);
                }
                true
            } else if let Some(existing) = triggers.values_mut().find(|t| t.same_condition(&trigger)) {
                existing.rearm();
                debug!(id, existing = existing.id, "identical trigger re-armed");
                return AddOutcome::Rearmed(existing.id);
            } else {
                debug!(id, kind = trigger.name(), ?period, "trigger added");
                triggers.insert(id, trigger);
                self.refresh(&triggers);
                false
            }
        };

        self.spawn_timer(id, period, ctx);
        if restart {
            AddOutcome::Rearmed(id)
        } else {
            AddOutcome::Created
        }
    }

    fn spawn_timer(self: &Arc<Self>, id: u32, period: Duration, ctx: Weak<dyn TriggerContext>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(id, "no runtime, trigger is only evaluated on demand");
            return;
        };
        let task = runtime.spawn(run_timer(Arc::downgrade(self), ctx, id, period));
        if let Some(previous) = self.timers.lock().insert(id, task) {
            previous.abort();
        }
    }

    /// Removes a trigger. Its timer is stopped before the entry goes away.
    pub fn remove(&self, id: u32) -> Option<Trigger> {
        if let Some(timer) = self.timers.lock().remove(&id) {
            timer.abort();
        }
        let mut triggers = self.triggers.write();
        let removed = triggers.remove(&id);
        self.refresh(&triggers);
        if removed.is_some() {
            debug!(id, "trigger removed");
        }
        removed
    }

    /// Removes every trigger and stops every timer.
    pub fn clear(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
        self.triggers.write().clear();
        self.summaries.store(false, Ordering::Release);
    }

    fn refresh(&self, triggers: &FxHashMap<u32, Trigger>) {
        self.summaries.store(triggers.values().any(Trigger::is_summary), Ordering::Release);
    }

    /// Evaluates trigger `id` once.
    pub fn tick(&self, id: u32, ctx: &dyn TriggerContext) -> Tick {
        let mut expired = false;
        let report = {
            let mut triggers = self.triggers.write();
            let Some(trigger) = triggers.get_mut(&id) else { return Tick::Stop };

            let report = match &mut trigger.kind {
                TriggerKind::Rssi(cond) => {
                    let cond = *cond;
                    ctx.rssi(cond.sta).and_then(|(current, rsrc)| {
                        let holds = cond.relation.holds(current, cond.value);
                        (trigger.edge(holds) == Edge::Fired).then(|| {
                            Message::RssiTrigger(RssiTriggerFired { id, wtp: ctx.wtp(), rsrc, current })
                        })
                    })
                }
                TriggerKind::Busyness(cond) => {
                    let cond = *cond;
                    ctx.busyness(cond.iface).zip(ctx.resource(cond.iface)).and_then(
                        |(current, rsrc)| {
                            let holds = cond.relation.holds(current, cond.value);
                            (trigger.edge(holds) == Edge::Fired).then(|| {
                                Message::BusynessTrigger(BusynessTriggerFired {
                                    id,
                                    wtp: ctx.wtp(),
                                    rsrc,
                                    current,
                                })
                            })
                        },
                    )
                }
                TriggerKind::Summary(state) => {
                    if state.frames.is_empty() {
                        None
                    } else {
                        let frames = mem::take(&mut state.frames);
                        state.sent = state.sent.saturating_add(1);
                        expired = state.limit.is_some_and(|limit| state.sent >= limit);
                        let rsrc = ctx.resource(state.iface).unwrap_or_default();
                        Some(Message::Summary(Summary { id, wtp: ctx.wtp(), rsrc, frames }))
                    }
                }
            };

            if expired {
                triggers.remove(&id);
                self.refresh(&triggers);
                // the timer is the caller, it stops on its own
                self.timers.lock().remove(&id);
                debug!(id, "summary trigger reached its limit");
            }
            report
        };

        if let Some(message) = report {
            trace!(id, "trigger fired");
            ctx.report(message);
        }

        if expired {
            Tick::Stop
        } else {
            Tick::Continue
        }
    }

    /// Feeds an observed frame to the summary triggers that match it.
    pub fn observe(&self, frame: &RxFrame) {
        if !self.summaries.load(Ordering::Acquire) {
            return;
        }
        let record = FrameRecord::from(frame);
        for trigger in self.triggers.write().values_mut() {
            if let TriggerKind::Summary(state) = &mut trigger.kind {
                if state.matches(frame) {
                    state.push(record);
                }
            }
        }
    }

    /// A copy of the trigger `id`.
    pub fn get(&self, id: u32) -> Option<Trigger> {
        self.triggers.read().get(&id).cloned()
    }

    /// Every trigger, ordered by id.
    pub fn triggers(&self) -> Vec<Trigger> {
        let mut triggers: Vec<_> = self.triggers.read().values().cloned().collect();
        triggers.sort_unstable_by_key(|t| t.id);
        triggers
    }

    /// Number of registered triggers.
    pub fn len(&self) -> usize {
        self.triggers.read().len()
    }

    /// Whether no trigger is registered.
    pub fn is_empty(&self) -> bool {
        self.triggers.read().is_empty()
    }

    /// Number of running timer tasks.
    pub fn timers(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Drop for TriggerEngine {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.abort();
        }
    }
}

async fn run_timer(
    engine: Weak<TriggerEngine>,
    ctx: Weak<dyn TriggerContext>,
    id: u32,
    period: Duration,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let (Some(live), Some(context)) = (engine.upgrade(), ctx.upgrade()) else { break };
        if live.tick(id, context.as_ref()) == Tick::Stop {
            break;
        }
    }
    trace!(id, "trigger timer stopped");
}
