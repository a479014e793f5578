//! Minstrel-style rate adaptation.
//!
//! Every remote address gets a [`RateRecord`] with per-rate success
//! statistics. Once per adaptation period the statistics are folded into a
//! smoothed success probability and a throughput estimate, and the preferred
//! rates are re-derived. Each frame then goes out with up to four rates: the
//! best-throughput rate (or a sampling rate ahead of it), then fallbacks.

use std::fmt;

use lvap_common::EtherAddress;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{frame::TxStatus, RateOptions};

pub mod airtime;

mod record;
use record::{RateRecord, PROB_SCALE};

/// Maximum number of rates in a [`RateSet`].
pub const MAX_RATES: usize = 4;

/// A transmission rate: a legacy rate in 500 kbps units, or an HT MCS index.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rate {
    ht: bool,
    value: u8,
}

impl Rate {
    /// A legacy rate in 500 kbps units.
    pub const fn legacy(value: u8) -> Self {
        Self { ht: false, value }
    }

    /// An HT MCS index.
    pub const fn ht(mcs: u8) -> Self {
        Self { ht: true, value: mcs }
    }

    /// Whether this is an HT rate.
    #[inline]
    pub const fn is_ht(&self) -> bool {
        self.ht
    }

    /// 500 kbps units for legacy rates, MCS index for HT rates.
    #[inline]
    pub const fn value(&self) -> u8 {
        self.value
    }

    /// Whether this is one of the 802.11b DSSS/CCK rates.
    #[inline]
    pub const fn is_dsss(&self) -> bool {
        !self.ht && matches!(self.value, 2 | 4 | 11 | 22)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ht {
            write!(f, "MCS{}", self.value)
        } else if self.value % 2 == 0 {
            write!(f, "{}M", self.value / 2)
        } else {
            write!(f, "{}.5M", self.value / 2)
        }
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One step of a retry chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateEntry {
    /// Rate to send at.
    pub rate: Rate,
    /// Attempts at this rate before moving on.
    pub tries: u8,
}

/// Ordered retry chain: the first entry is tried first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSet {
    entries: [RateEntry; MAX_RATES],
    len: usize,
}

impl RateSet {
    /// Appends `rate` unless it is already in the chain or the chain is full.
    pub fn push(&mut self, rate: Rate, tries: u8) {
        if self.len == MAX_RATES || self.iter().any(|e| e.rate == rate) {
            return;
        }
        self.entries[self.len] = RateEntry { rate, tries };
        self.len += 1;
    }

    /// The first rate of the chain.
    #[inline]
    pub fn primary(&self) -> Option<Rate> {
        self.iter().next().map(|e| e.rate)
    }

    /// Entries in the order they are tried.
    pub fn iter(&self) -> impl Iterator<Item = &RateEntry> {
        self.entries[..self.len].iter()
    }

    /// Number of entries.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the chain is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Statistics of one candidate rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RateInfo {
    /// The candidate rate.
    pub rate: Rate,
    /// Smoothed success probability in `[0.0, 1.0]`.
    pub probability: f64,
    /// Estimated throughput at this rate.
    pub throughput_kbps: u32,
    /// Attempts since the record was built.
    pub attempts: u64,
    /// Successes since the record was built.
    pub successes: u64,
}

/// Point-in-time view of a rate record.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    /// Rate with the highest estimated throughput.
    pub best_throughput: Rate,
    /// Rate with the second highest estimated throughput.
    pub second_throughput: Rate,
    /// Most reliable rate.
    pub best_probability: Rate,
    /// Most robust rate, the last resort of every chain.
    pub lowest: Rate,
    /// Frames selected for.
    pub packets: u64,
    /// Frames sent at a sampled rate.
    pub samples: u64,
    /// Every candidate rate.
    pub rates: Vec<RateInfo>,
}

impl From<&RateRecord> for RateSnapshot {
    fn from(record: &RateRecord) -> Self {
        Self {
            best_throughput: record.rates[record.max_tp].rate,
            second_throughput: record.rates[record.max_tp2].rate,
            best_probability: record.rates[record.max_prob].rate,
            lowest: record.rates[record.lowest].rate,
            packets: record.packet_count,
            samples: record.sample_count,
            rates: record
                .rates
                .iter()
                .map(|s| RateInfo {
                    rate: s.rate,
                    probability: s.prob as f64 / PROB_SCALE as f64,
                    throughput_kbps: s.throughput,
                    attempts: s.hist_attempts,
                    successes: s.hist_successes,
                })
                .collect(),
        }
    }
}

/// Rate adaptation for every remote address.
#[derive(Debug)]
pub struct RateController {
    options: RateOptions,
    records: RwLock<FxHashMap<EtherAddress, RateRecord>>,
}

impl RateController {
    /// Creates an empty controller.
    pub fn new(options: RateOptions) -> Self {
        Self { options, records: RwLock::default() }
    }

    /// Tuning in effect.
    pub fn options(&self) -> &RateOptions {
        &self.options
    }

    /// Installs a record for `addr` over `candidates`. An existing record with
    /// the same candidates keeps its statistics. Returns whether a record was
    /// (re)built.
    pub fn rebuild(&self, addr: EtherAddress, candidates: &[Rate], ht40: bool) -> bool {
        let mut records = self.records.write();
        if records.get(&addr).is_some_and(|r| r.same_candidates(candidates, ht40)) {
            return false;
        }
        match RateRecord::new(candidates, ht40) {
            Some(record) => {
                debug!(%addr, rates = candidates.len(), "rate record rebuilt");
                records.insert(addr, record);
                true
            }
            None => {
                records.remove(&addr);
                false
            }
        }
    }

    /// Forgets `addr`. Returns whether a record existed.
    pub fn evict(&self, addr: EtherAddress) -> bool {
        self.records.write().remove(&addr).is_some()
    }

    /// Whether `addr` has a rate record.
    pub fn contains(&self, addr: EtherAddress) -> bool {
        self.records.read().contains_key(&addr)
    }

    /// Number of rate records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether there are no rate records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Picks the retry chain for the next frame to `addr`.
    pub fn select(&self, addr: EtherAddress) -> Option<RateSet> {
        let mut records = self.records.write();
        let record = records.get_mut(&addr)?;
        Some(record.select(&self.options, &mut rand::thread_rng()))
    }

    /// Accounts a transmission outcome. Outcomes for group addresses or for
    /// addresses without a record are ignored.
    pub fn feedback(&self, status: &TxStatus) {
        if status.dst.is_group() {
            return;
        }
        let mut records = self.records.write();
        let Some(record) = records.get_mut(&status.dst) else {
            trace!(addr = %status.dst, "feedback for unknown address");
            return;
        };
        record.feedback(&status.rates, status.attempts, status.success);
    }

    /// Folds the statistics of every record. Runs once per adaptation period.
    pub fn update(&self) {
        for record in self.records.write().values_mut() {
            record.update(&self.options);
        }
    }

    /// Airtime of a `len` byte frame to `addr` at its current primary rate.
    pub fn airtime(&self, addr: EtherAddress, len: usize) -> Option<u32> {
        self.records.read().get(&addr).map(|r| r.airtime(len))
    }

    /// Point-in-time view of the record of `addr`.
    pub fn snapshot(&self, addr: EtherAddress) -> Option<RateSnapshot> {
        self.records.read().get(&addr).map(RateSnapshot::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STA: EtherAddress = EtherAddress::new([2, 0, 0, 0, 0, 1]);

    fn status(rate: Rate, success: bool) -> TxStatus {
        let mut rates = RateSet::default();
        rates.push(rate, 1);
        TxStatus { dst: STA, iface: 0, rates, attempts: 1, success }
    }

    #[test]
    fn rate_display() {
        assert_eq!(Rate::legacy(11).to_string(), "5.5M");
        assert_eq!(Rate::legacy(108).to_string(), "54M");
        assert_eq!(Rate::ht(7).to_string(), "MCS7");
    }

    #[test]
    fn rate_set_deduplicates() {
        let mut set = RateSet::default();
        for rate in [12, 24, 12, 48, 96, 108] {
            set.push(Rate::legacy(rate), 2);
        }
        let rates: Vec<_> = set.iter().map(|e| e.rate.value()).collect();
        assert_eq!(rates, vec![12, 24, 48, 96]);
    }

    #[test]
    fn converges_to_best_throughput() {
        let rates = [12, 24, 48, 108].map(Rate::legacy);
        let controller = RateController::new(RateOptions::default());
        assert!(controller.rebuild(STA, &rates, false));

        for _ in 0..3 {
            for i in 0..100 {
                controller.feedback(&status(Rate::legacy(12), true));
                controller.feedback(&status(Rate::legacy(24), true));
                controller.feedback(&status(Rate::legacy(48), true));
                // 54M only gets through one time in ten
                controller.feedback(&status(Rate::legacy(108), i % 10 == 0));
            }
            controller.update();
        }

        let snapshot = controller.snapshot(STA).unwrap();
        assert_eq!(snapshot.best_throughput, Rate::legacy(48));
        assert_eq!(snapshot.second_throughput, Rate::legacy(24));
        assert_eq!(snapshot.best_probability, Rate::legacy(48));
        assert_eq!(snapshot.lowest, Rate::legacy(12));

        let set = controller.select(STA).unwrap();
        assert!(set.iter().any(|e| e.rate == Rate::legacy(48)));
        assert!(set.iter().any(|e| e.rate == Rate::legacy(12)));
    }

    #[test]
    fn unknown_and_group_feedback_is_ignored() {
        let controller = RateController::new(RateOptions::default());
        controller.feedback(&status(Rate::legacy(12), true));
        assert!(controller.is_empty());

        controller.rebuild(STA, &[Rate::legacy(12)], false);
        let mut group = status(Rate::legacy(12), true);
        group.dst = EtherAddress::BROADCAST;
        controller.feedback(&group);
        controller.update();
        assert_eq!(controller.snapshot(STA).unwrap().rates[0].attempts, 0);
    }

    #[test]
    fn rebuild_keeps_matching_records() {
        let controller = RateController::new(RateOptions::default());
        let rates = [Rate::legacy(12), Rate::legacy(24)];
        assert!(controller.rebuild(STA, &rates, false));
        controller.select(STA);
        assert!(!controller.rebuild(STA, &rates, false));
        assert_eq!(controller.snapshot(STA).unwrap().packets, 1);

        assert!(controller.rebuild(STA, &rates[..1], false));
        assert_eq!(controller.snapshot(STA).unwrap().packets, 0);

        assert!(controller.evict(STA));
        assert!(controller.select(STA).is_none());
        assert!(controller.airtime(STA, 1500).is_none());
    }
}
