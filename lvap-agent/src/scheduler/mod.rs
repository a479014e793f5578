//! Airtime-fair traffic scheduling.
//!
//! Frames are queued per traffic rule, a (tenant, DSCP) pair. Rules are
//! served by deficit round robin with airtime as the cost, and inside a rule
//! every (receiver, transmitter) pair gets its own sub-queue, served round
//! robin, so that one busy destination does not starve its siblings.

use std::{
    collections::VecDeque,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tracing::debug;

use crate::{frame::Outbound, AddOutcome, SchedulerOptions};

mod classify;
pub use classify::{Admission, Classified, Classifier};

mod queue;
use queue::RuleQueue;

/// Identifies a traffic rule: tenant plus DSCP class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    /// Tenant.
    pub ssid: String,
    /// DSCP class.
    pub dscp: u8,
}

impl RuleKey {
    /// Key of tenant `ssid`, class `dscp`.
    pub fn new(ssid: impl Into<String>, dscp: u8) -> Self {
        Self { ssid: ssid.into(), dscp }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ssid, self.dscp)
    }
}

/// A full sub-queue refused the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

/// Point-in-time view of one traffic rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    /// Tenant and class.
    pub key: RuleKey,
    /// Airtime credited per round, in microseconds.
    pub quantum: u32,
    /// Whether frames may be aggregated.
    pub amsdu: bool,
    /// Airtime left in the current round.
    pub deficit: u64,
    /// Frames waiting over all sub-queues.
    pub queued: usize,
    /// Number of per-neighbor sub-queues.
    pub neighbors: usize,
    /// Frames accepted so far.
    pub enqueued: u64,
    /// Frames released so far.
    pub dequeued: u64,
    /// Frames refused by a full sub-queue.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct State {
    rules: FxHashMap<RuleKey, RuleQueue>,
    /// Rules with queued frames, in service order.
    rotation: VecDeque<RuleKey>,
    empty_pulls: u32,
}

/// Deficit round robin scheduler over traffic rules.
#[derive(Debug)]
pub struct Scheduler {
    options: SchedulerOptions,
    state: Mutex<State>,
    parked: AtomicBool,
    notify: Notify,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            options,
            state: Mutex::default(),
            parked: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Adds a rule, or updates quantum and aggregation of an existing one.
    pub fn add_rule(&self, key: RuleKey, quantum: u32, amsdu: bool) -> AddOutcome {
        let mut state = self.state.lock();
        match state.rules.get_mut(&key) {
            Some(rule) => {
                rule.quantum = quantum.max(1);
                rule.amsdu = amsdu;
                debug!(rule = %key, quantum, "traffic rule updated");
                AddOutcome::Updated
            }
            None => {
                debug!(rule = %key, quantum, "traffic rule created");
                state.rules.insert(key, RuleQueue::new(quantum, amsdu, self.options.queue_capacity));
                AddOutcome::Created
            }
        }
    }

    /// Removes a rule, dropping its queued frames. Returns whether it existed.
    pub fn remove_rule(&self, key: &RuleKey) -> bool {
        let mut state = self.state.lock();
        let Some(mut rule) = state.rules.remove(key) else { return false };
        state.rotation.retain(|k| k != key);
        let dropped = rule.clear();
        debug!(rule = %key, dropped, "traffic rule removed");
        true
    }

    /// Point-in-time view of the rule `key`.
    pub fn rule(&self, key: &RuleKey) -> Option<RuleInfo> {
        self.state.lock().rules.get(key).map(|rule| info(key, rule))
    }

    /// Every rule, ordered by key.
    pub fn rules(&self) -> Vec<RuleInfo> {
        let state = self.state.lock();
        let mut rules: Vec<_> = state.rules.iter().map(|(key, rule)| info(key, rule)).collect();
        rules.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        rules
    }

    /// Queues a frame under `(ssid, dscp)`. Without a rule for that class the
    /// frame falls back to the tenant's class 0, created on demand.
    pub fn enqueue(&self, ssid: &str, dscp: u8, out: Outbound) -> Result<(), QueueFull> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let exact = RuleKey::new(ssid, dscp);
        let key = if state.rules.contains_key(&exact) {
            exact
        } else {
            let fallback = RuleKey::new(ssid, 0);
            if !state.rules.contains_key(&fallback) {
                debug!(rule = %fallback, "traffic rule created on demand");
                state.rules.insert(
                    fallback.clone(),
                    RuleQueue::new(self.options.default_quantum, false, self.options.queue_capacity),
                );
            }
            fallback
        };

        let Some(rule) = state.rules.get_mut(&key) else { return Err(QueueFull) };
        rule.push(out).map_err(|_| QueueFull)?;
        if !rule.active {
            rule.active = true;
            state.rotation.push_back(key);
        }

        if self.parked.swap(false, Ordering::AcqRel) {
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Releases the next frame, or `None` if nothing is queued.
    ///
    /// `cost` estimates the airtime of a frame. It is called once per frame
    /// even if the frame has to wait for more deficit.
    pub fn dequeue(&self, mut cost: impl FnMut(&Outbound) -> u32) -> Option<Outbound> {
        let mut state = self.state.lock();
        let state = &mut *state;

        while let Some(key) = state.rotation.front() {
            let Some(rule) = state.rules.get_mut(key) else {
                state.rotation.pop_front();
                continue;
            };

            match rule.head_cost(&mut cost) {
                None => {
                    rule.deficit = 0;
                    rule.active = false;
                    state.rotation.pop_front();
                }
                Some(c) if c as u64 <= rule.deficit => {
                    rule.deficit -= c as u64;
                    state.empty_pulls = 0;
                    return rule.take();
                }
                Some(_) => {
                    rule.deficit += rule.quantum as u64;
                    state.rotation.rotate_left(1);
                }
            }
        }

        state.empty_pulls = state.empty_pulls.saturating_add(1);
        if state.empty_pulls >= self.options.max_empty_pulls {
            self.parked.store(true, Ordering::Release);
        }
        None
    }

    /// Resolves once frames may be available. Returns at once unless the
    /// scheduler parked after too many empty pulls.
    pub async fn ready(&self) {
        if self.parked.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }

    /// Whether the scheduler is parked waiting for an enqueue.
    #[inline]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    /// Total number of queued frames.
    pub fn len(&self) -> usize {
        self.state.lock().rules.values().map(RuleQueue::len).sum()
    }

    /// Whether no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().rules.values().all(RuleQueue::is_empty)
    }
}

fn info(key: &RuleKey, rule: &RuleQueue) -> RuleInfo {
    RuleInfo {
        key: key.clone(),
        quantum: rule.quantum,
        amsdu: rule.amsdu,
        deficit: rule.deficit,
        queued: rule.len(),
        neighbors: rule.neighbors(),
        enqueued: rule.enqueued,
        dequeued: rule.dequeued,
        dropped: rule.dropped,
    }
}
