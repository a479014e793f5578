use std::sync::atomic::{AtomicU64, Ordering};

use lvap_common::EtherAddress;
use lvap_wire::{MulticastMode, ResourceElement, SetPort, SizeCount};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::rate::Rate;

/// DSSS/CCK and OFDM rates of a 2.4 GHz radio, in 500 kbps units.
const RATES_2GHZ: [u8; 12] = [2, 4, 11, 22, 12, 18, 24, 36, 48, 72, 96, 108];
/// OFDM rates of a 5 GHz radio, in 500 kbps units.
const RATES_5GHZ: [u8; 8] = [12, 18, 24, 36, 48, 72, 96, 108];
/// Single stream HT MCS indexes enabled by default on HT radios.
const HT_MCS_DEFAULT: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// Frame counts bucketed by frame length.
///
/// Recording only needs a shared reference: totals are atomics and the
/// histogram has its own lock, so the data path never takes the policy
/// table's write lock.
#[derive(Debug, Default)]
pub struct SizeCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
    sizes: Mutex<FxHashMap<u16, u32>>,
}

impl SizeCounters {
    /// Counts one frame of `len` bytes.
    #[inline]
    pub fn record(&self, len: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);

        let size = u16::try_from(len).unwrap_or(u16::MAX);
        let mut sizes = self.sizes.lock();
        let count = sizes.entry(size).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Total number of frames recorded.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Total number of bytes recorded.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Counters ordered by size.
    pub fn to_vec(&self) -> Vec<SizeCount> {
        let mut counts: Vec<_> = self
            .sizes
            .lock()
            .iter()
            .map(|(size, count)| SizeCount { size: *size, count: *count })
            .collect();
        counts.sort_unstable_by_key(|c| c.size);
        counts
    }

    /// Resets every counter.
    pub fn clear(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
        self.sizes.lock().clear();
    }
}

impl Clone for SizeCounters {
    fn clone(&self) -> Self {
        Self {
            frames: AtomicU64::new(self.frames()),
            bytes: AtomicU64::new(self.bytes()),
            sizes: Mutex::new(self.sizes.lock().clone()),
        }
    }
}

impl PartialEq for SizeCounters {
    fn eq(&self, other: &Self) -> bool {
        self.frames() == other.frames() && self.bytes() == other.bytes() && self.to_vec() == other.to_vec()
    }
}

impl Eq for SizeCounters {}

/// How frames towards one address are sent on one radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPolicy {
    /// Send without waiting for an acknowledgement.
    pub no_ack: bool,
    /// RTS/CTS threshold in bytes.
    pub rts_cts: u16,
    /// How group frames are delivered.
    pub mcast: MulticastMode,
    /// Repetitions requested for unreliable multicast. Stored and reported,
    /// frames are not repeated.
    pub ur_count: u8,
    /// Legacy rates in 500 kbps units.
    pub mcs: Vec<u8>,
    /// HT MCS indexes.
    pub ht_mcs: Vec<u8>,
    /// Transmitted frames by size.
    pub tx: SizeCounters,
    /// Received frames by size.
    pub rx: SizeCounters,
}

impl TxPolicy {
    /// The default policy of a radio: every rate its band supports.
    pub fn for_radio(rsrc: &ResourceElement) -> Self {
        let mcs = if rsrc.channel > 14 { RATES_5GHZ.to_vec() } else { RATES_2GHZ.to_vec() };
        let ht_mcs = if rsrc.band.is_ht() { HT_MCS_DEFAULT.to_vec() } else { Vec::new() };
        Self {
            no_ack: false,
            rts_cts: 2436,
            mcast: MulticastMode::Legacy,
            ur_count: 3,
            mcs,
            ht_mcs,
            tx: SizeCounters::default(),
            rx: SizeCounters::default(),
        }
    }

    /// Replaces the configuration with the one carried by `port`, keeping the counters.
    pub fn apply(&mut self, port: &SetPort) {
        self.no_ack = port.no_ack;
        self.rts_cts = port.rts_cts;
        self.mcast = port.mcast;
        self.ur_count = port.ur_count;
        self.mcs = port.mcs.clone();
        self.ht_mcs = port.ht_mcs.clone();
    }

    /// The policy as a set-port message for `sta` on `rsrc`.
    pub fn to_port(&self, sta: EtherAddress, rsrc: ResourceElement) -> SetPort {
        SetPort {
            no_ack: self.no_ack,
            sta,
            rsrc,
            rts_cts: self.rts_cts,
            mcast: self.mcast,
            ur_count: self.ur_count,
            mcs: self.mcs.clone(),
            ht_mcs: self.ht_mcs.clone(),
        }
    }

    /// Candidate rates for rate adaptation, legacy first. HT rates are only
    /// offered on HT radios.
    pub fn candidates(&self, rsrc: &ResourceElement) -> Vec<Rate> {
        let mut rates: Vec<Rate> = self.mcs.iter().map(|r| Rate::legacy(*r)).collect();
        if rsrc.band.is_ht() {
            rates.extend(self.ht_mcs.iter().map(|m| Rate::ht(*m)));
        }
        rates.sort_unstable();
        rates.dedup();
        rates
    }
}

/// Policies keyed by (address, interface), with per-interface defaults.
#[derive(Debug, Default)]
pub(crate) struct PolicyTable {
    entries: FxHashMap<(EtherAddress, usize), TxPolicy>,
    defaults: Vec<TxPolicy>,
}

impl PolicyTable {
    pub(crate) fn new(resources: &[ResourceElement]) -> Self {
        Self {
            entries: FxHashMap::default(),
            defaults: resources.iter().map(TxPolicy::for_radio).collect(),
        }
    }

    /// Exact entry, then the broadcast entry for group addresses, then the radio default.
    pub(crate) fn lookup(&self, addr: EtherAddress, iface: usize) -> Option<&TxPolicy> {
        if let Some(policy) = self.entries.get(&(addr, iface)) {
            return Some(policy);
        }
        if addr.is_group() {
            if let Some(policy) = self.entries.get(&(EtherAddress::BROADCAST, iface)) {
                return Some(policy);
            }
        }
        self.defaults.get(iface)
    }

    /// Returns the exact entry, creating it from the radio default.
    pub(crate) fn entry(&mut self, addr: EtherAddress, iface: usize) -> Option<&mut TxPolicy> {
        let default = self.defaults.get(iface)?;
        Some(self.entries.entry((addr, iface)).or_insert_with(|| {
            let policy = default.clone();
            policy.tx.clear();
            policy.rx.clear();
            policy
        }))
    }

    pub(crate) fn get(&self, addr: EtherAddress, iface: usize) -> Option<&TxPolicy> {
        self.entries.get(&(addr, iface))
    }

    pub(crate) fn remove(&mut self, addr: EtherAddress, iface: usize) -> Option<TxPolicy> {
        self.entries.remove(&(addr, iface))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&(EtherAddress, usize), &TxPolicy)> {
        self.entries.iter()
    }
}
