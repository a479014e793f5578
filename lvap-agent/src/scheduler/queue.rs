use std::collections::VecDeque;

use lvap_common::{EtherAddress, RingBuffer};
use rustc_hash::FxHashMap;

use crate::frame::Outbound;

/// Frames towards one (receiver, transmitter) pair.
#[derive(Debug)]
struct NeighborQueue {
    ring: RingBuffer<Outbound>,
    /// Whether the queue is part of the inner rotation.
    active: bool,
}

/// Head frame taken out of its sub-queue, with its estimated cost.
#[derive(Debug)]
struct Pending {
    out: Outbound,
    cost: u32,
}

/// The queue of one traffic rule, split into per-neighbor sub-queues served
/// round robin.
#[derive(Debug)]
pub(crate) struct RuleQueue {
    pub(crate) quantum: u32,
    pub(crate) amsdu: bool,
    pub(crate) deficit: u64,
    /// Whether the rule is part of the outer rotation.
    pub(crate) active: bool,
    capacity: usize,
    queues: FxHashMap<(EtherAddress, EtherAddress), NeighborQueue>,
    rotation: VecDeque<(EtherAddress, EtherAddress)>,
    pending: Option<Pending>,
    len: usize,
    pub(crate) enqueued: u64,
    pub(crate) dequeued: u64,
    pub(crate) dropped: u64,
}

impl RuleQueue {
    pub(crate) fn new(quantum: u32, amsdu: bool, capacity: usize) -> Self {
        Self {
            quantum: quantum.max(1),
            amsdu,
            deficit: 0,
            active: false,
            capacity,
            queues: FxHashMap::default(),
            rotation: VecDeque::new(),
            pending: None,
            len: 0,
            enqueued: 0,
            dequeued: 0,
            dropped: 0,
        }
    }

    /// Appends `out` to its sub-queue. Gives the frame back when the
    /// sub-queue is full.
    pub(crate) fn push(&mut self, out: Outbound) -> Result<(), Outbound> {
        let key = (out.ra, out.ta);
        let capacity = self.capacity;
        let queue = self
            .queues
            .entry(key)
            .or_insert_with(|| NeighborQueue { ring: RingBuffer::with_capacity(capacity), active: false });

        if let Err(out) = queue.ring.try_push(out) {
            self.dropped += 1;
            return Err(out);
        }
        if !queue.active {
            queue.active = true;
            self.rotation.push_back(key);
        }
        self.len += 1;
        self.enqueued += 1;
        Ok(())
    }

    /// Cost of the head frame, pulling it out of its sub-queue if needed.
    /// Returns `None` when every sub-queue is empty.
    pub(crate) fn head_cost(&mut self, cost: &mut impl FnMut(&Outbound) -> u32) -> Option<u32> {
        if let Some(pending) = &self.pending {
            return Some(pending.cost);
        }
        while let Some(key) = self.rotation.front().copied() {
            let Some(queue) = self.queues.get_mut(&key) else {
                self.rotation.pop_front();
                continue;
            };
            match queue.ring.pop() {
                Some(out) => {
                    let c = cost(&out);
                    self.pending = Some(Pending { out, cost: c });
                    return Some(c);
                }
                None => {
                    self.rotation.pop_front();
                    self.queues.remove(&key);
                }
            }
        }
        None
    }

    /// Takes the head frame and moves its sub-queue to the back of the
    /// inner rotation.
    pub(crate) fn take(&mut self) -> Option<Outbound> {
        let pending = self.pending.take()?;
        if let Some(key) = self.rotation.pop_front() {
            match self.queues.get_mut(&key) {
                Some(queue) if !queue.ring.is_empty() => self.rotation.push_back(key),
                _ => {
                    self.queues.remove(&key);
                }
            }
        }
        self.len -= 1;
        self.dequeued += 1;
        Some(pending.out)
    }

    /// Queued frames, the pending head included.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of sub-queues with frames.
    pub(crate) fn neighbors(&self) -> usize {
        self.rotation.len()
    }

    /// Drops every queued frame. Returns how many were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.len;
        self.queues.clear();
        self.rotation.clear();
        self.pending = None;
        self.len = 0;
        self.dropped += dropped as u64;
        dropped
    }
}
