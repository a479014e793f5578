use std::time::Duration;

use lvap_common::EtherAddress;
use lvap_wire::{FrameRecord, Relation};

use crate::frame::RxFrame;

/// Shortest re-evaluation period accepted.
pub const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Threshold on the smoothed RSSI of one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RssiCondition {
    /// Station whose RSSI is watched.
    pub sta: EtherAddress,
    /// Comparison against `value`.
    pub relation: Relation,
    /// Threshold in dBm.
    pub value: i8,
}

/// Threshold on the channel busyness of one radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusynessCondition {
    /// Radio whose busyness is watched.
    pub iface: usize,
    /// Comparison against `value`.
    pub relation: Relation,
    /// Threshold.
    pub value: u32,
}

/// Frame metadata collection for one transmitter (or all of them) on one radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryState {
    /// Transmitter to match, broadcast for every transmitter.
    pub addr: EtherAddress,
    /// Radio the frames are heard on.
    pub iface: usize,
    /// Reports after which the trigger removes itself.
    pub limit: Option<u16>,
    /// Reports sent so far.
    pub sent: u16,
    /// Records buffered per period at most.
    pub capacity: usize,
    /// Records buffered in the current period.
    pub frames: Vec<FrameRecord>,
}

impl SummaryState {
    /// Whether `frame` belongs in this summary.
    #[inline]
    pub fn matches(&self, frame: &RxFrame) -> bool {
        frame.iface == self.iface && (self.addr.is_broadcast() || frame.ta == self.addr)
    }

    /// Buffers a record. Records past the capacity are dropped.
    pub fn push(&mut self, record: FrameRecord) {
        if self.frames.len() < self.capacity {
            self.frames.push(record);
        }
    }
}

/// Condition a trigger watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Smoothed RSSI of a station.
    Rssi(RssiCondition),
    /// Channel busyness of a radio.
    Busyness(BusynessCondition),
    /// Frame metadata collection.
    Summary(SummaryState),
}

/// Transition produced by an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// The condition started to hold: report it.
    Fired,
    /// The condition stopped holding.
    Cleared,
    /// Nothing changed.
    Steady,
}

/// A controller-registered condition, evaluated once per period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Controller-assigned identifier.
    pub id: u32,
    /// Evaluation period.
    pub period: Duration,
    /// Whether the condition held at the last evaluation.
    pub dispatched: bool,
    /// What the trigger watches.
    pub kind: TriggerKind,
}

impl Trigger {
    fn new(id: u32, period: Duration, kind: TriggerKind) -> Self {
        Self { id, period: period.max(MIN_PERIOD), dispatched: false, kind }
    }

    /// An RSSI threshold trigger.
    pub fn rssi(id: u32, sta: EtherAddress, relation: Relation, value: i8, period: Duration) -> Self {
        Self::new(id, period, TriggerKind::Rssi(RssiCondition { sta, relation, value }))
    }

    /// A channel busyness threshold trigger.
    pub fn busyness(id: u32, iface: usize, relation: Relation, value: u32, period: Duration) -> Self {
        Self::new(id, period, TriggerKind::Busyness(BusynessCondition { iface, relation, value }))
    }

    /// A summary trigger. A non-positive `limit` means unlimited.
    pub fn summary(
        id: u32,
        addr: EtherAddress,
        iface: usize,
        limit: i16,
        period: Duration,
        capacity: usize,
    ) -> Self {
        let limit = u16::try_from(limit).ok().filter(|l| *l > 0);
        Self::new(
            id,
            period,
            TriggerKind::Summary(SummaryState {
                addr,
                iface,
                limit,
                sent: 0,
                capacity,
                frames: Vec::new(),
            }),
        )
    }

    /// Short name of the trigger kind.
    pub const fn name(&self) -> &'static str {
        match self.kind {
            TriggerKind::Rssi(_) => "rssi",
            TriggerKind::Busyness(_) => "busyness",
            TriggerKind::Summary(_) => "summary",
        }
    }

    /// Whether this is a summary trigger.
    #[inline]
    pub const fn is_summary(&self) -> bool {
        matches!(self.kind, TriggerKind::Summary(_))
    }

    /// Feeds the current truth value of the condition.
    pub fn edge(&mut self, holds: bool) -> Edge {
        match (holds, self.dispatched) {
            (true, false) => {
                self.dispatched = true;
                Edge::Fired
            }
            (false, true) => {
                self.dispatched = false;
                Edge::Cleared
            }
            _ => Edge::Steady,
        }
    }

    /// Whether `other` watches the same thing under the same condition.
    pub fn same_condition(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TriggerKind::Rssi(a), TriggerKind::Rssi(b)) => a == b,
            (TriggerKind::Busyness(a), TriggerKind::Busyness(b)) => a == b,
            (TriggerKind::Summary(a), TriggerKind::Summary(b)) => {
                a.addr == b.addr && a.iface == b.iface && a.limit == b.limit
            }
            _ => false,
        }
    }

    /// Clears the dispatched state, and the report count of summaries.
    pub fn rearm(&mut self) {
        self.dispatched = false;
        if let TriggerKind::Summary(state) = &mut self.kind {
            state.sent = 0;
        }
    }
}
